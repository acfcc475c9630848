use serde::Serialize;

use crate::arbitration::ArbitrationOutcome;
use crate::domain::attempt::LinkingAttempt;
use crate::domain::client::ClientId;
use crate::domain::document::{DocumentId, LinkingStatus};
use crate::escalation::EscalationError;
use crate::resolution::MatchResult;

/// Something a tier concluded about a document.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkingEvent {
    DeterministicMatched { result: MatchResult },
    /// Batch reconciliation applied a planned match.
    Reconciled { result: MatchResult },
    RosterEmpty,
    ArbitrationUnavailable { reason: String },
    ArbitrationLinked { client_id: ClientId, confidence: f64, reason: String },
    ArbitrationDeclined { confidence: Option<f64>, reason: String },
    ArbitrationFailed { reason: String },
    EscalationSent { message_id: Option<String> },
    EscalationFailed { error: String },
}

impl LinkingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeterministicMatched { .. } => "deterministic_matched",
            Self::Reconciled { .. } => "reconciled",
            Self::RosterEmpty => "roster_empty",
            Self::ArbitrationUnavailable { .. } => "arbitration_unavailable",
            Self::ArbitrationLinked { .. } => "arbitration_linked",
            Self::ArbitrationDeclined { .. } => "arbitration_declined",
            Self::ArbitrationFailed { .. } => "arbitration_failed",
            Self::EscalationSent { .. } => "escalation_sent",
            Self::EscalationFailed { .. } => "escalation_failed",
        }
    }
}

impl From<ArbitrationOutcome> for LinkingEvent {
    fn from(outcome: ArbitrationOutcome) -> Self {
        match outcome {
            ArbitrationOutcome::Linked { client_id, confidence, reason } => {
                Self::ArbitrationLinked { client_id, confidence, reason }
            }
            ArbitrationOutcome::NoLink { confidence, reason } => {
                Self::ArbitrationDeclined { confidence, reason }
            }
            ArbitrationOutcome::Failed { reason } => Self::ArbitrationFailed { reason },
        }
    }
}

impl From<EscalationError> for LinkingEvent {
    fn from(error: EscalationError) -> Self {
        Self::EscalationFailed { error: error.to_string() }
    }
}

/// A decided transition: persist `attempt` and, when present, the new
/// status and client id, as one unit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkingTransition {
    pub document_id: DocumentId,
    pub from: LinkingStatus,
    pub to: LinkingStatus,
    pub client_id: Option<ClientId>,
    pub attempt: LinkingAttempt,
}

impl LinkingTransition {
    pub fn links(&self) -> bool {
        self.client_id.is_some()
    }
}
