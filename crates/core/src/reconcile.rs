//! Batch reconciliation: rerun the deterministic tiers over many unlinked
//! documents, either as a plan only or applying each match in turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::document::{DocumentId, LinkableDocument};
use crate::errors::LinkingError;
use crate::resolution::normalize::normalize_key;
use crate::resolution::{match_participants, CandidateIndex, MatchResult, MatchTier};

pub const TITLE_MATCH_CONFIDENCE: f64 = 0.60;
pub const MIN_TITLE_KEY_LEN: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    DryRun,
    Execute,
}

impl ReconcileMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            Self::DryRun
        } else {
            Self::Execute
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::DryRun)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStrategy {
    #[default]
    Email,
    Title,
    Both,
}

impl ReconcileStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Title => "title",
            Self::Both => "both",
        }
    }

    fn uses_email(&self) -> bool {
        matches!(self, Self::Email | Self::Both)
    }

    fn uses_title(&self) -> bool {
        matches!(self, Self::Title | Self::Both)
    }
}

impl std::str::FromStr for ReconcileStrategy {
    type Err = LinkingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "title" => Ok(Self::Title),
            "both" => Ok(Self::Both),
            other => Err(LinkingError::Validation(format!(
                "unsupported reconcile strategy `{other}` (expected email|title|both)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedDocument {
    pub document_id: DocumentId,
    pub title: String,
    #[serde(flatten)]
    pub result: MatchResult,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnmatchedDocument {
    pub id: DocumentId,
    pub title: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ReconciliationPlan {
    pub matched: Vec<MatchedDocument>,
    pub unmatched: Vec<UnmatchedDocument>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub id: DocumentId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub executed: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub dry_run: bool,
    pub strategy: ReconcileStrategy,
    pub matched: Vec<MatchedDocument>,
    pub unmatched: Vec<UnmatchedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_results: Option<Vec<ExecutionResult>>,
    pub summary: ReconciliationSummary,
}

/// Persists one planned link. Implementations decide how the link is
/// recorded; a failure only affects the document it was called for.
#[async_trait]
pub trait LinkApplier: Send + Sync {
    async fn apply_link(&self, planned: &MatchedDocument) -> Result<(), LinkingError>;
}

/// First client, in roster order, whose business key appears in the title.
pub fn match_title(title: &str, index: &CandidateIndex) -> Option<MatchResult> {
    let normalized = normalize_key(title);
    if normalized.is_empty() {
        return None;
    }

    index.candidates().iter().find_map(|candidate| {
        let key = candidate.business_key.as_deref()?;
        if key.len() < MIN_TITLE_KEY_LEN || !normalized.contains(key) {
            return None;
        }
        Some(MatchResult {
            client_id: candidate.client_id.clone(),
            confidence: TITLE_MATCH_CONFIDENCE,
            reason: format!("title mentions business key `{key}`"),
            tier: MatchTier::Title,
        })
    })
}

pub fn plan_reconciliation(
    owner_email: &str,
    documents: &[LinkableDocument],
    index: &CandidateIndex,
    strategy: ReconcileStrategy,
) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();

    for document in documents.iter().filter(|document| !document.is_linked()) {
        let by_email = strategy
            .uses_email()
            .then(|| match_participants(owner_email, &document.participant_emails, index))
            .flatten();
        let found = by_email.or_else(|| {
            strategy.uses_title().then(|| match_title(&document.title, index)).flatten()
        });

        match found {
            Some(result) => plan.matched.push(MatchedDocument {
                document_id: document.id.clone(),
                title: document.title.clone(),
                result,
            }),
            None => plan.unmatched.push(UnmatchedDocument {
                id: document.id.clone(),
                title: document.title.clone(),
            }),
        }
    }

    plan
}

/// Plan, then (in execute mode) apply each match sequentially. Application
/// failures are recorded per document and never stop the batch.
pub async fn reconcile<A>(
    owner_email: &str,
    documents: &[LinkableDocument],
    index: &CandidateIndex,
    mode: ReconcileMode,
    strategy: ReconcileStrategy,
    applier: &A,
) -> ReconciliationReport
where
    A: LinkApplier + ?Sized,
{
    let plan = plan_reconciliation(owner_email, documents, index, strategy);
    let total = plan.matched.len() + plan.unmatched.len();

    let execution_results = match mode {
        ReconcileMode::DryRun => None,
        ReconcileMode::Execute => {
            let mut results = Vec::with_capacity(plan.matched.len());
            for planned in &plan.matched {
                let outcome = applier.apply_link(planned).await;
                if let Err(error) = &outcome {
                    tracing::warn!(
                        event_name = "reconcile.apply_failed",
                        document_id = %planned.document_id,
                        error = %error,
                        "failed to apply reconciled link"
                    );
                }
                results.push(ExecutionResult {
                    id: planned.document_id.clone(),
                    success: outcome.is_ok(),
                    error: outcome.err().map(|error| error.to_string()),
                });
            }
            Some(results)
        }
    };

    let executed = execution_results
        .as_ref()
        .map(|results| results.iter().filter(|result| result.success).count())
        .unwrap_or(0);
    let summary = ReconciliationSummary {
        total,
        matched: plan.matched.len(),
        unmatched: plan.unmatched.len(),
        executed,
    };

    tracing::info!(
        event_name = "reconcile.completed",
        dry_run = mode.is_dry_run(),
        strategy = strategy.as_str(),
        total = summary.total,
        matched = summary.matched,
        unmatched = summary.unmatched,
        executed = summary.executed,
        "batch reconciliation completed"
    );

    ReconciliationReport {
        dry_run: mode.is_dry_run(),
        strategy,
        matched: plan.matched,
        unmatched: plan.unmatched,
        execution_results,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::domain::client::{ClientId, ClientRecord, OwnerId};
    use crate::domain::document::{DocumentId, DocumentKind, LinkableDocument};
    use crate::errors::LinkingError;
    use crate::resolution::{CandidateIndex, MatchTier};

    use super::{
        match_title, plan_reconciliation, reconcile, LinkApplier, MatchedDocument, ReconcileMode,
        ReconcileStrategy, TITLE_MATCH_CONFIDENCE,
    };

    const OWNER: &str = "owner@agency.com";

    fn owner() -> OwnerId {
        OwnerId("owner-1".to_string())
    }

    fn roster() -> Vec<ClientRecord> {
        vec![
            ClientRecord::new("c1", owner()).with_email("jane@acme.com").with_name("Acme"),
            ClientRecord::new("c2", owner()).with_email("ops@globex.io").with_name("Globex"),
            ClientRecord::new("c3", owner()).with_email("hi@initech.dev").with_name("Initech"),
        ]
    }

    fn document(id: &str, title: &str, participants: &[&str]) -> LinkableDocument {
        LinkableDocument::new(id, owner(), DocumentKind::Transcript, title, Utc::now())
            .with_participants(participants.iter().copied())
    }

    /// Ten documents, three of which resolve by participant email.
    fn ten_documents() -> Vec<LinkableDocument> {
        let mut documents = vec![
            document("d0", "Sync", &[OWNER, "jane@acme.com"]),
            document("d1", "Sync", &["ops@globex.io"]),
            document("d2", "Sync", &["someone@initech.dev"]),
        ];
        for n in 3..10 {
            documents.push(document(&format!("d{n}"), "Weekly call", &["x@unknown.org"]));
        }
        documents
    }

    #[derive(Default)]
    struct RecordingApplier {
        fail_for: Option<String>,
        applied: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LinkApplier for RecordingApplier {
        async fn apply_link(&self, planned: &MatchedDocument) -> Result<(), LinkingError> {
            if self.fail_for.as_deref() == Some(planned.document_id.0.as_str()) {
                return Err(LinkingError::Persistence("simulated write failure".to_string()));
            }
            self.applied.lock().expect("lock").push(planned.document_id.0.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn dry_run_plans_without_applying() {
        let index = CandidateIndex::build(&roster());
        let applier = RecordingApplier::default();

        let report = reconcile(
            OWNER,
            &ten_documents(),
            &index,
            ReconcileMode::DryRun,
            ReconcileStrategy::Email,
            &applier,
        )
        .await;

        assert!(report.dry_run);
        assert_eq!(report.summary.total, 10);
        assert_eq!(report.summary.matched, 3);
        assert_eq!(report.summary.unmatched, 7);
        assert_eq!(report.summary.executed, 0);
        assert!(report.execution_results.is_none());
        assert!(applier.applied.lock().expect("lock").is_empty());

        let json = serde_json::to_value(&report).expect("serialize");
        assert!(json.get("executionResults").is_none());
        assert_eq!(json["dryRun"], true);
    }

    #[tokio::test]
    async fn execute_continues_past_a_failed_application() {
        let index = CandidateIndex::build(&roster());
        let applier =
            RecordingApplier { fail_for: Some("d1".to_string()), ..RecordingApplier::default() };

        let report = reconcile(
            OWNER,
            &ten_documents(),
            &index,
            ReconcileMode::Execute,
            ReconcileStrategy::Email,
            &applier,
        )
        .await;

        let results = report.execution_results.expect("execution results");
        assert_eq!(results.len(), 3);
        let failed: Vec<_> = results.iter().filter(|result| !result.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, DocumentId("d1".to_string()));
        assert!(failed[0].error.as_deref().is_some_and(|error| error.contains("simulated")));
        assert!(results.iter().filter(|result| result.id.0 != "d1").all(|result| result.success));
        assert_eq!(report.summary.executed, 2);
        assert_eq!(*applier.applied.lock().expect("lock"), vec!["d0", "d2"]);
    }

    #[test]
    fn title_tier_takes_first_roster_hit_and_ignores_short_keys() {
        let roster = vec![
            ClientRecord::new("short", owner()).with_name("AB"),
            ClientRecord::new("c1", owner()).with_name("Acme"),
            ClientRecord::new("c2", owner()).with_name("Acme Labs"),
        ];
        let index = CandidateIndex::build(&roster);

        let found = match_title("Acme Labs / quarterly review", &index).expect("title match");
        assert_eq!(found.client_id, ClientId("c1".to_string()));
        assert_eq!(found.confidence, TITLE_MATCH_CONFIDENCE);
        assert_eq!(found.tier, MatchTier::Title);

        assert!(match_title("AB testing", &index).is_none());
    }

    #[test]
    fn both_strategy_prefers_email_tiers_over_title() {
        let index = CandidateIndex::build(&roster());
        let documents = vec![
            document("d0", "Globex planning", &["jane@acme.com"]),
            document("d1", "Initech kickoff", &["x@unknown.org"]),
        ];

        let email_only =
            plan_reconciliation(OWNER, &documents, &index, ReconcileStrategy::Email);
        assert_eq!(email_only.matched.len(), 1);

        let both = plan_reconciliation(OWNER, &documents, &index, ReconcileStrategy::Both);
        assert_eq!(both.matched.len(), 2);
        assert_eq!(both.matched[0].result.client_id, ClientId("c1".to_string()));
        assert_eq!(both.matched[0].result.tier, MatchTier::ExactEmail);
        assert_eq!(both.matched[1].result.client_id, ClientId("c3".to_string()));
        assert_eq!(both.matched[1].result.tier, MatchTier::Title);

        let title_only =
            plan_reconciliation(OWNER, &documents, &index, ReconcileStrategy::Title);
        assert_eq!(title_only.matched[0].result.client_id, ClientId("c2".to_string()));
    }

    #[test]
    fn strategy_parses_from_operator_input() {
        assert_eq!("Both".parse::<ReconcileStrategy>().ok(), Some(ReconcileStrategy::Both));
        assert!(matches!(
            "fuzzy".parse::<ReconcileStrategy>(),
            Err(LinkingError::Validation(_))
        ));
    }
}
