use rosterlink_core::config::{AppConfig, LlmProvider, LoadOptions};
use rosterlink_db::{connect_from_config, migrations, DbPool};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.push(check_arbitration_tier(&config));
            checks.push(check_escalation_tier(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Fail,
                error.to_string(),
            ));
            for name in
                ["arbitration_tier", "escalation_tier", "database_connectivity", "schema_migrations"]
            {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    // Optional tiers may be skipped; only failures make the report fail.
    let healthy = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if healthy { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if healthy {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_arbitration_tier(config: &AppConfig) -> DoctorCheck {
    if !config.llm_ready() {
        return DoctorCheck::new(
            "arbitration_tier",
            CheckStatus::Skipped,
            "no LLM credentials; unmatched documents go straight to human review",
        );
    }

    let provider = match config.llm.provider {
        LlmProvider::OpenAi => "openai",
        LlmProvider::Ollama => "ollama",
    };
    DoctorCheck::new(
        "arbitration_tier",
        CheckStatus::Pass,
        format!("{provider} model `{}` at {}", config.llm.model, config.llm.effective_base_url()),
    )
}

fn check_escalation_tier(config: &AppConfig) -> DoctorCheck {
    match config.escalation.chat_id.as_deref().filter(|_| config.escalation_ready()) {
        Some(chat_id) => DoctorCheck::new(
            "escalation_tier",
            CheckStatus::Pass,
            format!("telegram alerts go to chat {chat_id}"),
        ),
        None => DoctorCheck::new(
            "escalation_tier",
            CheckStatus::Skipped,
            "telegram is not configured; escalations are skipped",
        ),
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Fail,
                format!("failed to initialize async runtime: {error}"),
            )];
        }
    };

    runtime.block_on(async {
        let pool = match connect_from_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::new(
                        "database_connectivity",
                        CheckStatus::Fail,
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::new(
                        "schema_migrations",
                        CheckStatus::Skipped,
                        "skipped because the database is unreachable",
                    ),
                ];
            }
        };

        let connectivity = DoctorCheck::new(
            "database_connectivity",
            CheckStatus::Pass,
            format!("connected using `{}`", config.database.url),
        );
        let schema = schema_check(&pool).await;
        pool.close().await;
        vec![connectivity, schema]
    })
}

async fn schema_check(pool: &DbPool) -> DoctorCheck {
    let known = migrations::MIGRATOR
        .iter()
        .filter(|migration| migration.migration_type.is_up_migration())
        .count();
    match migrations::applied_versions(pool).await {
        Ok(applied) if applied.len() >= known => DoctorCheck::new(
            "schema_migrations",
            CheckStatus::Pass,
            format!("{} of {known} migrations applied", applied.len()),
        ),
        Ok(applied) => DoctorCheck::new(
            "schema_migrations",
            CheckStatus::Fail,
            format!("{} of {known} migrations applied; run `rosterlink migrate`", applied.len()),
        ),
        Err(_) => DoctorCheck::new(
            "schema_migrations",
            CheckStatus::Fail,
            "schema has not been initialized; run `rosterlink migrate`",
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
