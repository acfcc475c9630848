//! Per-document resolution pipeline.
//!
//! One call walks a document through the tiers in order: already-linked
//! short-circuit, deterministic matcher, model arbitration, then human
//! escalation. Every decided transition is persisted before the next tier
//! runs. Batches are processed one document at a time.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rosterlink_core::arbitration::{ArbitrationRequest, Arbitrator};
use rosterlink_core::audit::{AuditContext, AuditSink, TracingAuditSink};
use rosterlink_core::config::{AppConfig, ReconcileConfig};
use rosterlink_core::domain::attempt::{AttemptStage, LinkingAttempt};
use rosterlink_core::domain::client::{AccountOwner, ClientId, ClientRecord, OwnerId};
use rosterlink_core::domain::document::{DocumentId, LinkableDocument, LinkingStatus};
use rosterlink_core::errors::LinkingError;
use rosterlink_core::escalation::{
    escalation_already_sent, EscalationAlert, EscalationChannel, EscalationOutcome,
};
use rosterlink_core::linking::{LinkingEvent, LinkingStateMachine, LinkingTransition};
use rosterlink_core::reconcile::{
    reconcile, LinkApplier, MatchedDocument, ReconcileMode, ReconcileStrategy,
    ReconciliationReport,
};
use rosterlink_core::resolution::{match_participants, CandidateIndex, MatchResult};
use rosterlink_db::repositories::{
    InMemoryClientRepository, InMemoryDocumentRepository, InMemoryEscalationClaimRepository,
    InMemoryOwnerRepository, SqlClientRepository, SqlDocumentRepository,
    SqlEscalationClaimRepository, SqlOwnerRepository,
};
use rosterlink_db::{
    ClientRepository, DbPool, DocumentRepository, EscalationClaimRepository, OwnerRepository,
};

const AI_UNAVAILABLE_REASON: &str = "AI arbitration is not configured";

/// Storage handles the service reads and writes through.
#[derive(Clone)]
pub struct Repositories {
    pub owners: Arc<dyn OwnerRepository>,
    pub clients: Arc<dyn ClientRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub claims: Arc<dyn EscalationClaimRepository>,
}

impl Repositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            owners: Arc::new(SqlOwnerRepository::new(pool.clone())),
            clients: Arc::new(SqlClientRepository::new(pool.clone())),
            documents: Arc::new(SqlDocumentRepository::new(pool.clone())),
            claims: Arc::new(SqlEscalationClaimRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            owners: Arc::new(InMemoryOwnerRepository::default()),
            clients: Arc::new(InMemoryClientRepository::default()),
            documents: Arc::new(InMemoryDocumentRepository::default()),
            claims: Arc::new(InMemoryEscalationClaimRepository::default()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    AlreadyLinked {
        #[serde(rename = "clientId")]
        client_id: ClientId,
    },
    AutoLinked {
        #[serde(rename = "clientId")]
        client_id: ClientId,
        confidence: f64,
        reason: String,
    },
    AiLinked {
        #[serde(rename = "clientId")]
        client_id: ClientId,
        confidence: f64,
        reason: String,
    },
    /// The deterministic tiers found nothing and no further tier was run.
    Unmatched,
    NeedsHuman { reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionReport {
    pub document_id: DocumentId,
    pub status: LinkingStatus,
    #[serde(flatten)]
    pub outcome: ResolutionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationOutcome>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcileRequest {
    pub dry_run: bool,
    pub limit: Option<u32>,
    pub strategy: ReconcileStrategy,
}

pub struct LinkingService {
    repositories: Repositories,
    arbitrator: Option<Arc<dyn Arbitrator>>,
    escalation: Option<Arc<dyn EscalationChannel>>,
    audit: Arc<dyn AuditSink>,
    machine: LinkingStateMachine,
    limits: ReconcileConfig,
}

impl LinkingService {
    pub fn new(repositories: Repositories) -> Self {
        Self {
            repositories,
            arbitrator: None,
            escalation: None,
            audit: Arc::new(TracingAuditSink),
            machine: LinkingStateMachine::new(),
            limits: AppConfig::default().reconcile,
        }
    }

    pub fn with_arbitrator(mut self, arbitrator: Arc<dyn Arbitrator>) -> Self {
        self.arbitrator = Some(arbitrator);
        self
    }

    pub fn with_escalation(mut self, channel: Arc<dyn EscalationChannel>) -> Self {
        self.escalation = Some(channel);
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn with_reconcile_limits(mut self, limits: ReconcileConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repositories
    }

    /// Full pipeline for one document.
    pub async fn resolve(
        &self,
        document_id: &DocumentId,
        audit: &AuditContext,
    ) -> Result<ResolutionReport, LinkingError> {
        let document = self.load_document(document_id).await?;
        if let Some(report) = already_linked(&document) {
            return Ok(report);
        }

        let (owner, roster) = self.load_roster(&document.owner_id).await?;
        let index = CandidateIndex::build(&roster);

        if let Some(result) =
            match_participants(&owner.email, &document.participant_emails, &index)
        {
            return self.link_deterministically(&document, result, audit).await;
        }

        let document = self.run_arbitration(document, &owner, &roster, audit).await?;
        if document.linking_status != LinkingStatus::NeedsHuman {
            return Ok(report_for(&document));
        }

        let escalation = self.escalate_document(&document, audit).await?;
        let document = self.load_document(document_id).await?;
        let mut report = report_for(&document);
        report.escalation = Some(escalation);
        Ok(report)
    }

    /// Deterministic tiers only. A miss leaves the document untouched.
    pub async fn resolve_deterministic(
        &self,
        document_id: &DocumentId,
        audit: &AuditContext,
    ) -> Result<ResolutionReport, LinkingError> {
        let document = self.load_document(document_id).await?;
        if let Some(report) = already_linked(&document) {
            return Ok(report);
        }

        let (owner, roster) = self.load_roster(&document.owner_id).await?;
        let index = CandidateIndex::build(&roster);
        match match_participants(&owner.email, &document.participant_emails, &index) {
            Some(result) => self.link_deterministically(&document, result, audit).await,
            None => Ok(ResolutionReport {
                document_id: document.id.clone(),
                status: document.linking_status,
                outcome: ResolutionOutcome::Unmatched,
                escalation: None,
            }),
        }
    }

    /// Model tier only; skips the deterministic matcher.
    pub async fn arbitrate(
        &self,
        document_id: &DocumentId,
        audit: &AuditContext,
    ) -> Result<ResolutionReport, LinkingError> {
        let document = self.load_document(document_id).await?;
        if let Some(report) = already_linked(&document) {
            return Ok(report);
        }

        let (owner, roster) = self.load_roster(&document.owner_id).await?;
        let document = self.run_arbitration(document, &owner, &roster, audit).await?;
        Ok(report_for(&document))
    }

    /// Escalation tier only. Network failures come back as
    /// [`EscalationOutcome::Failed`]; only load and persistence failures are errors.
    pub async fn escalate(
        &self,
        document_id: &DocumentId,
        audit: &AuditContext,
    ) -> Result<EscalationOutcome, LinkingError> {
        let document = self.load_document(document_id).await?;
        self.escalate_document(&document, audit).await
    }

    /// Resolve documents strictly one after another.
    pub async fn resolve_many(
        &self,
        document_ids: &[DocumentId],
        audit: &AuditContext,
    ) -> Vec<Result<ResolutionReport, LinkingError>> {
        let mut reports = Vec::with_capacity(document_ids.len());
        for document_id in document_ids {
            let report = self.resolve(document_id, audit).await;
            if let Err(error) = &report {
                warn!(
                    event_name = "linking.resolve_failed",
                    correlation_id = %audit.correlation_id,
                    document_id = %document_id,
                    error = %error,
                    "document resolution failed"
                );
            }
            reports.push(report);
        }
        reports
    }

    pub async fn history(
        &self,
        document_id: &DocumentId,
    ) -> Result<LinkableDocument, LinkingError> {
        self.load_document(document_id).await
    }

    /// Batch reconciliation over the owner's unlinked documents.
    pub async fn reconcile(
        &self,
        owner_id: &OwnerId,
        request: &ReconcileRequest,
        audit: &AuditContext,
    ) -> Result<ReconciliationReport, LinkingError> {
        let limit = self.clamp_limit(request.limit)?;
        let (owner, roster) = self.load_roster(owner_id).await?;
        let documents = self.repositories.documents.list_unlinked(owner_id, limit).await?;
        let index = CandidateIndex::build(&roster);

        let applier = ServiceLinkApplier { service: self, audit };
        Ok(reconcile(
            &owner.email,
            &documents,
            &index,
            ReconcileMode::from_dry_run(request.dry_run),
            request.strategy,
            &applier,
        )
        .await)
    }

    fn clamp_limit(&self, requested: Option<u32>) -> Result<u32, LinkingError> {
        match requested {
            Some(0) => Err(LinkingError::Validation("limit must be at least 1".to_string())),
            Some(limit) => Ok(limit.min(self.limits.max_limit)),
            None => Ok(self.limits.default_limit.min(self.limits.max_limit)),
        }
    }

    async fn load_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<LinkableDocument, LinkingError> {
        self.repositories
            .documents
            .find_by_id(document_id)
            .await?
            .ok_or_else(|| LinkingError::not_found("document", document_id.0.clone()))
    }

    async fn load_roster(
        &self,
        owner_id: &OwnerId,
    ) -> Result<(AccountOwner, Vec<ClientRecord>), LinkingError> {
        let owner = self
            .repositories
            .owners
            .find_by_id(owner_id)
            .await?
            .ok_or_else(|| LinkingError::not_found("owner", owner_id.0.clone()))?;
        let roster = self.repositories.clients.list_for_owner(owner_id).await?;
        Ok((owner, roster))
    }

    async fn record(
        &self,
        document: &LinkableDocument,
        event: LinkingEvent,
        audit: &AuditContext,
    ) -> Result<LinkingTransition, LinkingError> {
        let transition = self.machine.apply_with_audit(
            document,
            &event,
            Utc::now(),
            self.audit.as_ref(),
            audit,
        )?;
        self.repositories.documents.record_transition(&transition).await?;
        Ok(transition)
    }

    async fn link_deterministically(
        &self,
        document: &LinkableDocument,
        result: MatchResult,
        audit: &AuditContext,
    ) -> Result<ResolutionReport, LinkingError> {
        let event = LinkingEvent::DeterministicMatched { result: result.clone() };
        let transition = self.record(document, event, audit).await?;
        Ok(ResolutionReport {
            document_id: document.id.clone(),
            status: transition.to,
            outcome: ResolutionOutcome::AutoLinked {
                client_id: result.client_id,
                confidence: result.confidence,
                reason: result.reason,
            },
            escalation: None,
        })
    }

    /// Runs (or skips) the model tier and returns the document as stored
    /// afterwards.
    async fn run_arbitration(
        &self,
        document: LinkableDocument,
        owner: &AccountOwner,
        roster: &[ClientRecord],
        audit: &AuditContext,
    ) -> Result<LinkableDocument, LinkingError> {
        let event = if roster.is_empty() {
            LinkingEvent::RosterEmpty
        } else {
            match &self.arbitrator {
                Some(arbitrator) => {
                    let request = ArbitrationRequest::build(&owner.email, &document, roster);
                    LinkingEvent::from(arbitrator.arbitrate(&request).await)
                }
                None => LinkingEvent::ArbitrationUnavailable {
                    reason: AI_UNAVAILABLE_REASON.to_string(),
                },
            }
        };

        self.record(&document, event, audit).await?;
        self.load_document(&document.id).await
    }

    async fn escalate_document(
        &self,
        document: &LinkableDocument,
        audit: &AuditContext,
    ) -> Result<EscalationOutcome, LinkingError> {
        let skipped = |reason: &str| {
            info!(
                event_name = "escalation.skipped",
                correlation_id = %audit.correlation_id,
                document_id = %document.id,
                reason,
                "escalation skipped"
            );
            EscalationOutcome::Skipped { reason: reason.to_string() }
        };

        if document.is_linked() {
            return Ok(skipped("document is already linked"));
        }
        if document.linking_status != LinkingStatus::NeedsHuman {
            return Ok(skipped("document has not been through the automated tiers"));
        }
        if escalation_already_sent(&document.linking_history) {
            return Ok(skipped("escalation already sent"));
        }
        let Some(channel) = &self.escalation else {
            return Ok(skipped("escalation channel is not configured"));
        };

        let alert = EscalationAlert::from_document(document);
        let claims = &self.repositories.claims;
        if !claims.try_reserve(&document.id, &alert.fingerprint(), Utc::now()).await? {
            return Ok(skipped("escalation already claimed"));
        }

        match channel.send(&alert).await {
            Ok(receipt) => {
                let message_id = receipt.message_id;
                self.record(
                    document,
                    LinkingEvent::EscalationSent { message_id: message_id.clone() },
                    audit,
                )
                .await?;
                // History already blocks a resend; a stuck claim only needs cleanup.
                if let Err(error) = claims.complete(&document.id, Utc::now()).await {
                    warn!(
                        event_name = "escalation.claim_complete_failed",
                        correlation_id = %audit.correlation_id,
                        document_id = %document.id,
                        error = %error,
                        "escalation sent but claim was not completed"
                    );
                }
                Ok(EscalationOutcome::Sent { message_id })
            }
            Err(error) => {
                let message = error.to_string();
                claims.release(&document.id, &message, Utc::now()).await?;
                self.record(document, LinkingEvent::from(error), audit).await?;
                Ok(EscalationOutcome::Failed { error: message })
            }
        }
    }
}

fn already_linked(document: &LinkableDocument) -> Option<ResolutionReport> {
    let client_id = document.client_id.clone()?;
    info!(
        event_name = "linking.already_linked",
        document_id = %document.id,
        client_id = %client_id,
        "document already linked"
    );
    Some(ResolutionReport {
        document_id: document.id.clone(),
        status: document.linking_status,
        outcome: ResolutionOutcome::AlreadyLinked { client_id },
        escalation: None,
    })
}

fn report_for(document: &LinkableDocument) -> ResolutionReport {
    let latest = document.latest_attempt();
    let confidence = latest.and_then(|attempt| attempt.confidence).unwrap_or_default();
    let reason = latest.map(|attempt| attempt.reason.clone()).unwrap_or_default();

    let outcome = match (document.linking_status, document.client_id.clone()) {
        (LinkingStatus::AutoLinked, Some(client_id)) => {
            ResolutionOutcome::AutoLinked { client_id, confidence, reason }
        }
        (LinkingStatus::AiLinked, Some(client_id)) => {
            ResolutionOutcome::AiLinked { client_id, confidence, reason }
        }
        (LinkingStatus::NeedsHuman, _) => ResolutionOutcome::NeedsHuman {
            reason: last_tier_reason(&document.linking_history),
        },
        _ => ResolutionOutcome::Unmatched,
    };

    ResolutionReport {
        document_id: document.id.clone(),
        status: document.linking_status,
        outcome,
        escalation: None,
    }
}

/// Reason from the latest automated attempt, ignoring escalation entries.
fn last_tier_reason(history: &[LinkingAttempt]) -> String {
    history
        .iter()
        .rev()
        .find(|attempt| attempt.stage != AttemptStage::Telegram)
        .map(|attempt| attempt.reason.clone())
        .unwrap_or_default()
}

struct ServiceLinkApplier<'a> {
    service: &'a LinkingService,
    audit: &'a AuditContext,
}

#[async_trait]
impl LinkApplier for ServiceLinkApplier<'_> {
    async fn apply_link(&self, planned: &MatchedDocument) -> Result<(), LinkingError> {
        let document = self.service.load_document(&planned.document_id).await?;
        let event = LinkingEvent::Reconciled { result: planned.result.clone() };
        self.service.record(&document, event, self.audit).await.map(|_| ())
    }
}
