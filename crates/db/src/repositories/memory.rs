use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use rosterlink_core::domain::attempt::LinkingAttempt;
use rosterlink_core::domain::client::{AccountOwner, ClientRecord, OwnerId};
use rosterlink_core::domain::document::{DocumentId, LinkableDocument};
use rosterlink_core::domain::escalation::{ClaimState, EscalationClaim};
use rosterlink_core::linking::{commit, LinkingTransition};

use super::{
    ClientRepository, DocumentRepository, EscalationClaimRepository, OwnerRepository,
    RepositoryError,
};

#[derive(Default)]
pub struct InMemoryOwnerRepository {
    owners: RwLock<HashMap<String, AccountOwner>>,
}

#[async_trait::async_trait]
impl OwnerRepository for InMemoryOwnerRepository {
    async fn find_by_id(&self, id: &OwnerId) -> Result<Option<AccountOwner>, RepositoryError> {
        let owners = self.owners.read().await;
        Ok(owners.get(&id.0).cloned())
    }

    async fn save(&self, owner: AccountOwner) -> Result<(), RepositoryError> {
        let mut owners = self.owners.write().await;
        owners.insert(owner.id.0.clone(), owner);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryClientRepository {
    clients: RwLock<HashMap<String, ClientRecord>>,
}

#[async_trait::async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn list_for_owner(
        &self,
        owner_id: &OwnerId,
    ) -> Result<Vec<ClientRecord>, RepositoryError> {
        let clients = self.clients.read().await;
        let mut roster: Vec<ClientRecord> =
            clients.values().filter(|client| &client.owner_id == owner_id).cloned().collect();
        roster.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(roster)
    }

    async fn save(&self, client: ClientRecord) -> Result<(), RepositoryError> {
        let mut clients = self.clients.write().await;
        clients.insert(client.id.0.clone(), client);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDocumentRepository {
    documents: RwLock<HashMap<String, LinkableDocument>>,
}

#[async_trait::async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn find_by_id(
        &self,
        id: &DocumentId,
    ) -> Result<Option<LinkableDocument>, RepositoryError> {
        let documents = self.documents.read().await;
        Ok(documents.get(&id.0).cloned())
    }

    async fn save(&self, document: LinkableDocument) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write().await;
        let mut document = document;
        if let Some(existing) = documents.get(&document.id.0) {
            let stored = existing.linking_history.len().min(document.linking_history.len());
            let appended = document.linking_history.split_off(stored);
            document.linking_history = existing.linking_history.clone();
            document.linking_history.extend(appended);
            document.linking_status = existing.linking_status;
            document.client_id = existing.client_id.clone();
            document.last_link_attempt_at = existing.last_link_attempt_at;
        }
        documents.insert(document.id.0.clone(), document);
        Ok(())
    }

    async fn list_unlinked(
        &self,
        owner_id: &OwnerId,
        limit: u32,
    ) -> Result<Vec<LinkableDocument>, RepositoryError> {
        let documents = self.documents.read().await;
        let mut unlinked: Vec<LinkableDocument> = documents
            .values()
            .filter(|document| &document.owner_id == owner_id && !document.is_linked())
            .cloned()
            .collect();
        unlinked.sort_by(|left, right| {
            left.timestamp.cmp(&right.timestamp).then_with(|| left.id.cmp(&right.id))
        });
        unlinked.truncate(limit as usize);
        Ok(unlinked)
    }

    async fn history(&self, id: &DocumentId) -> Result<Vec<LinkingAttempt>, RepositoryError> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(&id.0)
            .map(|document| document.linking_history.clone())
            .unwrap_or_default())
    }

    async fn record_transition(
        &self,
        transition: &LinkingTransition,
    ) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write().await;
        let document = documents
            .get_mut(&transition.document_id.0)
            .filter(|document| !document.is_linked())
            .ok_or_else(|| {
                RepositoryError::Conflict(format!(
                    "document `{}` is missing or already linked",
                    transition.document_id
                ))
            })?;
        commit(document, transition);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEscalationClaimRepository {
    claims: RwLock<HashMap<String, EscalationClaim>>,
}

#[async_trait::async_trait]
impl EscalationClaimRepository for InMemoryEscalationClaimRepository {
    async fn try_reserve(
        &self,
        document_id: &DocumentId,
        payload_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut claims = self.claims.write().await;
        match claims.get_mut(&document_id.0) {
            Some(claim) if !claim.state.is_reclaimable() => Ok(false),
            Some(claim) => {
                claim.state = ClaimState::Reserved;
                claim.payload_hash = payload_hash.to_string();
                claim.attempt_count += 1;
                claim.reserved_at = at;
                claim.updated_at = at;
                claim.last_error = None;
                Ok(true)
            }
            None => {
                claims.insert(
                    document_id.0.clone(),
                    EscalationClaim {
                        document_id: document_id.clone(),
                        state: ClaimState::Reserved,
                        payload_hash: payload_hash.to_string(),
                        attempt_count: 1,
                        reserved_at: at,
                        updated_at: at,
                        last_error: None,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn complete(
        &self,
        document_id: &DocumentId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut claims = self.claims.write().await;
        if let Some(claim) =
            claims.get_mut(&document_id.0).filter(|claim| claim.state == ClaimState::Reserved)
        {
            claim.state = ClaimState::Completed;
            claim.updated_at = at;
            claim.last_error = None;
        }
        Ok(())
    }

    async fn release(
        &self,
        document_id: &DocumentId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut claims = self.claims.write().await;
        if let Some(claim) =
            claims.get_mut(&document_id.0).filter(|claim| claim.state == ClaimState::Reserved)
        {
            claim.state = ClaimState::Failed;
            claim.updated_at = at;
            claim.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn find(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<EscalationClaim>, RepositoryError> {
        let claims = self.claims.read().await;
        Ok(claims.get(&document_id.0).cloned())
    }
}
