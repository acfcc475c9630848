use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use rosterlink_core::config::AppConfig;
use rosterlink_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    arbitration_enabled: bool,
    escalation_enabled: bool,
}

impl HealthState {
    pub fn new(db_pool: DbPool, config: &AppConfig) -> Self {
        Self {
            db_pool,
            arbitration_enabled: config.llm_ready(),
            escalation_enabled: config.escalation_ready(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

/// Optional tiers report `enabled`/`disabled`; neither affects readiness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TierStatus {
    pub arbitration: &'static str,
    pub escalation: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub tiers: TierStatus,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        tiers: TierStatus {
            arbitration: enabled(state.arbitration_enabled),
            escalation: enabled(state.escalation_enabled),
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM linkable_document");
    match count.fetch_one(pool).await {
        Ok(documents) => {
            HealthCheck { status: "ready", detail: format!("{documents} documents tracked") }
        }
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}
