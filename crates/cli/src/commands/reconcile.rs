use rosterlink_core::audit::AuditContext;
use rosterlink_core::config::AppConfig;
use rosterlink_core::domain::client::OwnerId;
use rosterlink_core::errors::LinkingError;
use rosterlink_core::reconcile::{ReconcileStrategy, ReconciliationReport};
use rosterlink_db::{connect_from_config, migrations};
use rosterlink_server::pipeline::{LinkingService, ReconcileRequest, Repositories};
use uuid::Uuid;

use crate::commands::{
    build_runtime, load_config, CommandResult, EXIT_DB_CONNECTIVITY, EXIT_INVALID_ARGUMENT,
    EXIT_LINKING, EXIT_MIGRATION, EXIT_NOT_FOUND,
};

const COMMAND: &str = "reconcile";
const ACTOR: &str = "cli";

#[derive(Clone, Debug)]
pub struct ReconcileArgs {
    pub owner: String,
    pub execute: bool,
    pub limit: Option<u32>,
    pub strategy: String,
}

type Failure = (&'static str, String, u8);

pub fn run(args: ReconcileArgs) -> CommandResult {
    let strategy = match args.strategy.parse::<ReconcileStrategy>() {
        Ok(strategy) => strategy,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "invalid_argument",
                error.to_string(),
                EXIT_INVALID_ARGUMENT,
            );
        }
    };
    let request = ReconcileRequest { dry_run: !args.execute, limit: args.limit, strategy };

    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let owner_id = OwnerId(args.owner);
    match runtime.block_on(reconcile_owner(&config, &owner_id, &request)) {
        Ok(report) => {
            let details = serde_json::to_value(&report).ok();
            CommandResult::success_with_details(COMMAND, summary_line(&report), details)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(COMMAND, error_class, message, exit_code)
        }
    }
}

async fn reconcile_owner(
    config: &AppConfig,
    owner_id: &OwnerId,
    request: &ReconcileRequest,
) -> Result<ReconciliationReport, Failure> {
    let pool = connect_from_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;
    if let Err(error) = migrations::run_pending(&pool).await {
        pool.close().await;
        return Err(("migration", error.to_string(), EXIT_MIGRATION));
    }

    let service = LinkingService::new(Repositories::sql(pool.clone()))
        .with_reconcile_limits(config.reconcile.clone());
    let audit = AuditContext::new(Uuid::new_v4().to_string(), ACTOR);
    let result = service.reconcile(owner_id, request, &audit).await;
    pool.close().await;

    result.map_err(classify)
}

fn classify(error: LinkingError) -> Failure {
    match error {
        LinkingError::NotFound { .. } => ("not_found", error.to_string(), EXIT_NOT_FOUND),
        LinkingError::Validation(_) => {
            ("invalid_argument", error.to_string(), EXIT_INVALID_ARGUMENT)
        }
        other => ("linking", other.to_string(), EXIT_LINKING),
    }
}

fn summary_line(report: &ReconciliationReport) -> String {
    let summary = &report.summary;
    let mode = if report.dry_run { "dry run" } else { "execute" };
    format!(
        "{mode} ({}): {} documents, {} matched, {} unmatched, {} linked",
        report.strategy.as_str(),
        summary.total,
        summary.matched,
        summary.unmatched,
        summary.executed
    )
}
