pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::reconcile::ReconcileArgs;
use commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "rosterlink",
    about = "Rosterlink operator CLI",
    long_about = "Operate rosterlink: apply migrations, inspect configuration, check readiness, and reconcile unlinked documents.",
    after_help = "Examples:\n  rosterlink doctor --json\n  rosterlink reconcile --owner owner-1\n  rosterlink reconcile --owner owner-1 --strategy both --execute"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, optional tier readiness, and database schema")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Match an owner's unlinked documents against their roster")]
    Reconcile {
        #[arg(long, help = "Account owner whose documents are reconciled")]
        owner: String,
        #[arg(long, help = "Apply the planned links instead of reporting a dry run")]
        execute: bool,
        #[arg(long, help = "Maximum documents to consider (clamped to reconcile.max_limit)")]
        limit: Option<u32>,
        #[arg(long, default_value = "email", help = "Matching strategy: email, title or both")]
        strategy: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => CommandResult::text(commands::config::run()),
        Command::Doctor { json } => CommandResult::text(commands::doctor::run(json)),
        Command::Reconcile { owner, execute, limit, strategy } => {
            commands::reconcile::run(ReconcileArgs { owner, execute, limit, strategy })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
