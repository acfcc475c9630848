use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use rosterlink_core::audit::AuditContext;
use rosterlink_core::domain::attempt::LinkingAttempt;
use rosterlink_core::domain::client::{ClientId, OwnerId};
use rosterlink_core::domain::document::{DocumentId, LinkingStatus};
use rosterlink_core::errors::{InterfaceError, LinkingError};
use rosterlink_core::escalation::EscalationOutcome;
use rosterlink_core::reconcile::ReconciliationReport;

use crate::pipeline::{LinkingService, ReconcileRequest, ResolutionReport};

const ACTOR: &str = "api";

#[derive(Clone)]
pub struct ApiState {
    service: Arc<LinkingService>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub error: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn from_linking(error: LinkingError, audit: &AuditContext) -> Self {
        Self(error.into_interface(audit.correlation_id.clone()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message),
            InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, message),
            InterfaceError::ServiceUnavailable { message, .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, message)
            }
            InterfaceError::Internal { message, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        if status.is_server_error() {
            warn!(
                event_name = "api.request_failed",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                detail = %detail,
                "request failed"
            );
        }

        let body = ApiErrorBody {
            error: self.0.user_message(),
            detail: detail.clone(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationResponse {
    pub document_id: DocumentId,
    #[serde(flatten)]
    pub outcome: EscalationOutcome,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub document_id: DocumentId,
    pub linking_status: LinkingStatus,
    pub client_id: Option<ClientId>,
    pub history: Vec<LinkingAttempt>,
}

pub fn router(service: Arc<LinkingService>) -> Router {
    Router::new()
        .route("/api/v1/documents/{id}/resolve", post(resolve_document))
        .route("/api/v1/documents/{id}/escalate", post(escalate_document))
        .route("/api/v1/documents/{id}/history", get(document_history))
        .route("/api/v1/owners/{owner_id}/reconcile", post(reconcile_owner))
        .with_state(ApiState { service })
}

fn request_context() -> AuditContext {
    AuditContext::new(Uuid::new_v4().to_string(), ACTOR)
}

pub async fn resolve_document(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<ResolutionReport>, ApiError> {
    let audit = request_context();
    state
        .service
        .resolve(&DocumentId(id), &audit)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_linking(error, &audit))
}

pub async fn escalate_document(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<EscalationResponse>, ApiError> {
    let audit = request_context();
    let document_id = DocumentId(id);
    let outcome = state
        .service
        .escalate(&document_id, &audit)
        .await
        .map_err(|error| ApiError::from_linking(error, &audit))?;
    Ok(Json(EscalationResponse { document_id, outcome }))
}

pub async fn document_history(
    Path(id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let audit = request_context();
    let document = state
        .service
        .history(&DocumentId(id))
        .await
        .map_err(|error| ApiError::from_linking(error, &audit))?;
    Ok(Json(HistoryResponse {
        document_id: document.id,
        linking_status: document.linking_status,
        client_id: document.client_id,
        history: document.linking_history,
    }))
}

pub async fn reconcile_owner(
    Path(owner_id): Path<String>,
    State(state): State<ApiState>,
    payload: Result<Json<ReconcileRequest>, JsonRejection>,
) -> Result<Json<ReconciliationReport>, ApiError> {
    let audit = request_context();
    let Json(request) = payload.map_err(|rejection| {
        ApiError::from_linking(LinkingError::Validation(rejection.body_text()), &audit)
    })?;

    state
        .service
        .reconcile(&OwnerId(owner_id), &request, &audit)
        .await
        .map(Json)
        .map_err(|error| ApiError::from_linking(error, &audit))
}
