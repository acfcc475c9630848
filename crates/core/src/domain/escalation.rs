use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::document::DocumentId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    Reserved,
    Completed,
    Failed,
}

impl ClaimState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reserved" => Some(Self::Reserved),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Only a failed claim can be reserved again.
    pub fn is_reclaimable(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Single-row guard taken before an escalation alert leaves the process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationClaim {
    pub document_id: DocumentId,
    pub state: ClaimState,
    pub payload_hash: String,
    pub attempt_count: u32,
    pub reserved_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::ClaimState;

    #[test]
    fn claim_state_round_trips_from_storage_encoding() {
        for state in [ClaimState::Reserved, ClaimState::Completed, ClaimState::Failed] {
            assert_eq!(ClaimState::parse(state.as_str()), Some(state));
        }
    }

    #[test]
    fn only_failed_claims_are_reclaimable() {
        assert!(ClaimState::Failed.is_reclaimable());
        assert!(!ClaimState::Reserved.is_reclaimable());
        assert!(!ClaimState::Completed.is_reclaimable());
    }
}
