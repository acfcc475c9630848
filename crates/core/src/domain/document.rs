use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::attempt::LinkingAttempt;
use crate::domain::client::{ClientId, OwnerId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Transcript,
    FormResponse,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcript => "transcript",
            Self::FormResponse => "form_response",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "transcript" => Some(Self::Transcript),
            "form_response" => Some(Self::FormResponse),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkingStatus {
    Unlinked,
    AutoLinked,
    AiLinked,
    NeedsHuman,
}

impl LinkingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unlinked => "unlinked",
            Self::AutoLinked => "auto_linked",
            Self::AiLinked => "ai_linked",
            Self::NeedsHuman => "needs_human",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unlinked" => Some(Self::Unlinked),
            "auto_linked" => Some(Self::AutoLinked),
            "ai_linked" => Some(Self::AiLinked),
            "needs_human" => Some(Self::NeedsHuman),
            _ => None,
        }
    }
}

/// A transcript or form response waiting to be associated with a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkableDocument {
    pub id: DocumentId,
    pub owner_id: OwnerId,
    pub kind: DocumentKind,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub participant_emails: Vec<String>,
    pub content: Option<String>,
    pub linking_status: LinkingStatus,
    pub client_id: Option<ClientId>,
    pub last_link_attempt_at: Option<DateTime<Utc>>,
    pub linking_history: Vec<LinkingAttempt>,
}

impl LinkableDocument {
    pub fn new(
        id: impl Into<String>,
        owner_id: OwnerId,
        kind: DocumentKind,
        title: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DocumentId(id.into()),
            owner_id,
            kind,
            title: title.into(),
            timestamp,
            participant_emails: Vec::new(),
            content: None,
            linking_status: LinkingStatus::Unlinked,
            client_id: None,
            last_link_attempt_at: None,
            linking_history: Vec::new(),
        }
    }

    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participant_emails = participants.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn is_linked(&self) -> bool {
        self.client_id.is_some()
    }

    pub fn latest_attempt(&self) -> Option<&LinkingAttempt> {
        self.linking_history.last()
    }
}
