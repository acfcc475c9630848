use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The account owner whose roster a document is resolved against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOwner {
    pub id: OwnerId,
    pub email: String,
}

/// A customer record owned by an account owner. Read-only to the linking pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: ClientId,
    pub owner_id: OwnerId,
    pub business_email: Option<String>,
    pub business_name: Option<String>,
    pub contact_name: Option<String>,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ClientRecord {
    pub fn new(id: impl Into<String>, owner_id: OwnerId) -> Self {
        Self {
            id: ClientId(id.into()),
            owner_id,
            business_email: None,
            business_name: None,
            contact_name: None,
            status: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.business_email = Some(email.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.business_name = Some(name.into());
        self
    }
}
