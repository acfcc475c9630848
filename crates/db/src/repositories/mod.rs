use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use rosterlink_core::domain::attempt::LinkingAttempt;
use rosterlink_core::domain::client::{AccountOwner, ClientRecord, OwnerId};
use rosterlink_core::domain::document::{DocumentId, LinkableDocument};
use rosterlink_core::domain::escalation::EscalationClaim;
use rosterlink_core::errors::LinkingError;
use rosterlink_core::linking::LinkingTransition;

pub mod client;
pub mod document;
pub mod escalation;
pub mod memory;
pub mod owner;

mod codec;

pub use client::SqlClientRepository;
pub use document::SqlDocumentRepository;
pub use escalation::SqlEscalationClaimRepository;
pub use memory::{
    InMemoryClientRepository, InMemoryDocumentRepository, InMemoryEscalationClaimRepository,
    InMemoryOwnerRepository,
};
pub use owner::SqlOwnerRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("write conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for LinkingError {
    fn from(error: RepositoryError) -> Self {
        LinkingError::Persistence(error.to_string())
    }
}

#[async_trait]
pub trait OwnerRepository: Send + Sync {
    async fn find_by_id(&self, id: &OwnerId) -> Result<Option<AccountOwner>, RepositoryError>;
    async fn save(&self, owner: AccountOwner) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// The owner's roster in insertion order (`created_at`, then `id`).
    async fn list_for_owner(&self, owner_id: &OwnerId)
        -> Result<Vec<ClientRecord>, RepositoryError>;
    async fn save(&self, client: ClientRecord) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn find_by_id(&self, id: &DocumentId)
        -> Result<Option<LinkableDocument>, RepositoryError>;

    /// Upserts the document row. History entries already stored are kept;
    /// entries beyond the stored history are appended. Status, client id and
    /// `last_link_attempt_at` are only taken on insert; afterwards they
    /// change through `record_transition` alone.
    async fn save(&self, document: LinkableDocument) -> Result<(), RepositoryError>;

    /// Documents without a client, oldest first.
    async fn list_unlinked(
        &self,
        owner_id: &OwnerId,
        limit: u32,
    ) -> Result<Vec<LinkableDocument>, RepositoryError>;

    async fn history(&self, id: &DocumentId) -> Result<Vec<LinkingAttempt>, RepositoryError>;

    /// Appends the transition's attempt and updates status, client id and
    /// `last_link_attempt_at` atomically. Fails with `Conflict` when the
    /// document is missing or was linked in the meantime.
    async fn record_transition(&self, transition: &LinkingTransition)
        -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait EscalationClaimRepository: Send + Sync {
    /// Single conditional write: succeeds for a new claim or a previously
    /// failed one, and returns `false` when a reserved or completed claim
    /// already exists.
    async fn try_reserve(
        &self,
        document_id: &DocumentId,
        payload_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn complete(&self, document_id: &DocumentId, at: DateTime<Utc>)
        -> Result<(), RepositoryError>;

    async fn release(
        &self,
        document_id: &DocumentId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn find(&self, document_id: &DocumentId)
        -> Result<Option<EscalationClaim>, RepositoryError>;
}
