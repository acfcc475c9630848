use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::client::ClientId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStage {
    Auto,
    Ai,
    Telegram,
}

impl AttemptStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Ai => "ai",
            Self::Telegram => "telegram",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "ai" => Some(Self::Ai),
            "telegram" => Some(Self::Telegram),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    NoMatch,
    Error,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NoMatch => "no_match",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "no_match" => Some(Self::NoMatch),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One entry of a document's append-only linking history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkingAttempt {
    pub stage: AttemptStage,
    pub status: AttemptStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(rename = "clientId", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    pub reason: String,
}

impl LinkingAttempt {
    pub fn new(
        stage: AttemptStage,
        status: AttemptStatus,
        timestamp: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self { stage, status, timestamp, confidence: None, client_id: None, reason: reason.into() }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn with_client(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn is(&self, stage: AttemptStage, status: AttemptStatus) -> bool {
        self.stage == stage && self.status == status
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{AttemptStage, AttemptStatus, LinkingAttempt};

    #[test]
    fn stage_and_status_round_trip_from_storage_encoding() {
        for stage in [AttemptStage::Auto, AttemptStage::Ai, AttemptStage::Telegram] {
            assert_eq!(AttemptStage::parse(stage.as_str()), Some(stage));
        }
        for status in [AttemptStatus::Success, AttemptStatus::NoMatch, AttemptStatus::Error] {
            assert_eq!(AttemptStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn confidence_is_clamped_into_unit_interval() {
        let attempt = LinkingAttempt::new(AttemptStage::Ai, AttemptStatus::NoMatch, Utc::now(), "x")
            .with_confidence(1.7);
        assert_eq!(attempt.confidence, Some(1.0));

        let attempt = attempt.with_confidence(-0.2);
        assert_eq!(attempt.confidence, Some(0.0));
    }

    #[test]
    fn persisted_shape_omits_absent_optional_fields() {
        let attempt =
            LinkingAttempt::new(AttemptStage::Telegram, AttemptStatus::Success, Utc::now(), "sent");
        let value = serde_json::to_value(&attempt).expect("serialize attempt");

        assert_eq!(value["stage"], "telegram");
        assert_eq!(value["status"], "success");
        assert!(value.get("confidence").is_none());
        assert!(value.get("clientId").is_none());
    }
}
