//! Human escalation when neither automated tier could link a document.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::arbitration::truncate_chars;
use crate::domain::attempt::{AttemptStage, AttemptStatus, LinkingAttempt};
use crate::domain::document::{DocumentId, DocumentKind, LinkableDocument, LinkingStatus};

pub const MAX_PREVIEW_CHARS: usize = 400;

/// The content of one alert, independent of the channel that delivers it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EscalationAlert {
    pub document_id: DocumentId,
    pub kind: DocumentKind,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub participants: Vec<String>,
    pub status: LinkingStatus,
    pub last_reason: Option<String>,
    pub preview: Option<String>,
}

impl EscalationAlert {
    pub fn from_document(document: &LinkableDocument) -> Self {
        Self {
            document_id: document.id.clone(),
            kind: document.kind,
            title: document.title.clone(),
            timestamp: document.timestamp,
            participants: document.participant_emails.clone(),
            status: document.linking_status,
            last_reason: document.latest_attempt().map(|attempt| attempt.reason.clone()),
            preview: document
                .content
                .as_deref()
                .map(str::trim)
                .filter(|content| !content.is_empty())
                .map(|content| truncate_chars(content, MAX_PREVIEW_CHARS)),
        }
    }

    /// Stable fingerprint of the alert body, stored with the escalation claim.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.document_id.0.as_bytes());
        hasher.update(self.title.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        for participant in &self.participants {
            hasher.update(participant.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EscalationReceipt {
    pub message_id: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EscalationError {
    #[error("escalation channel is not configured: {0}")]
    NotConfigured(String),
    #[error("escalation request failed: {0}")]
    Network(String),
    #[error("escalation channel rejected the message: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait EscalationChannel: Send + Sync {
    async fn send(&self, alert: &EscalationAlert) -> Result<EscalationReceipt, EscalationError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EscalationOutcome {
    Sent { message_id: Option<String> },
    Skipped { reason: String },
    Failed { error: String },
}

/// The history-scan idempotency guard: true once any escalation for this
/// document has succeeded.
pub fn escalation_already_sent(history: &[LinkingAttempt]) -> bool {
    history.iter().any(|attempt| attempt.is(AttemptStage::Telegram, AttemptStatus::Success))
}
