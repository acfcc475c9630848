//! HTTP surface and orchestration for document-to-client linking.

pub mod api;
pub mod bootstrap;
pub mod health;
pub mod pipeline;

use axum::Router;

pub use bootstrap::{bootstrap, bootstrap_with_config, Application, BootstrapError};
pub use pipeline::{LinkingService, ReconcileRequest, Repositories, ResolutionReport};

/// Full application router: linking API plus `/health`.
pub fn app_router(app: &Application) -> Router {
    api::router(app.service.clone())
        .merge(health::router(health::HealthState::new(app.db_pool.clone(), &app.config)))
}
