use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use rosterlink_agent::{LlmArbitrator, LlmError};
use rosterlink_core::audit::TracingAuditSink;
use rosterlink_core::config::{AppConfig, ConfigError, LoadOptions};
use rosterlink_db::{connect_from_config, migrations, DbPool};
use rosterlink_telegram::{TelegramError, TelegramEscalationChannel};

use crate::pipeline::{LinkingService, Repositories};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<LinkingService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("telegram client setup failed: {0}")]
    Telegram(#[from] TelegramError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let mut service = LinkingService::new(Repositories::sql(db_pool.clone()))
        .with_audit_sink(Arc::new(TracingAuditSink))
        .with_reconcile_limits(config.reconcile.clone());

    if config.llm_ready() {
        service = service.with_arbitrator(Arc::new(LlmArbitrator::from_config(&config.llm)?));
        info!(
            event_name = "system.bootstrap.arbitration_enabled",
            correlation_id = "bootstrap",
            model = %config.llm.model,
            "ai arbitration enabled"
        );
    } else {
        warn!(
            event_name = "system.bootstrap.arbitration_disabled",
            correlation_id = "bootstrap",
            "no llm credentials; unmatched documents go straight to needs_human"
        );
    }

    if config.escalation_ready() {
        let channel = TelegramEscalationChannel::from_config(&config.escalation)?;
        service = service.with_escalation(Arc::new(channel));
        info!(
            event_name = "system.bootstrap.escalation_enabled",
            correlation_id = "bootstrap",
            "telegram escalation enabled"
        );
    } else {
        warn!(
            event_name = "system.bootstrap.escalation_disabled",
            correlation_id = "bootstrap",
            "telegram is not configured; escalations will be skipped"
        );
    }

    Ok(Application { config, db_pool, service: Arc::new(service) })
}
