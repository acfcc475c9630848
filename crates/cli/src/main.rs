use std::process::ExitCode;

fn main() -> ExitCode {
    rosterlink_cli::run()
}
