use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::attempt::{AttemptStage, AttemptStatus, LinkingAttempt};
use crate::domain::client::ClientId;
use crate::domain::document::{LinkableDocument, LinkingStatus};
use crate::linking::states::{LinkingEvent, LinkingTransition};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LinkingTransitionError {
    #[error("document is already linked to client {client_id}")]
    AlreadyLinked { client_id: ClientId },
    #[error("invalid transition from {status:?} using event {event}")]
    InvalidTransition { status: LinkingStatus, event: &'static str },
}

/// Decides how a document's linking status moves in response to tier
/// outcomes. Pure: callers persist the returned transition.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinkingStateMachine;

impl LinkingStateMachine {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(
        &self,
        document: &LinkableDocument,
        event: &LinkingEvent,
        at: DateTime<Utc>,
    ) -> Result<LinkingTransition, LinkingTransitionError> {
        use LinkingStatus::{AiLinked, AutoLinked, NeedsHuman, Unlinked};

        if let Some(client_id) = &document.client_id {
            return Err(LinkingTransitionError::AlreadyLinked { client_id: client_id.clone() });
        }

        let from = document.linking_status;
        let at = document.last_link_attempt_at.map_or(at, |last| at.max(last));
        let invalid =
            || LinkingTransitionError::InvalidTransition { status: from, event: event.name() };

        let (to, client_id, attempt) = match (from, event) {
            (Unlinked | NeedsHuman, LinkingEvent::DeterministicMatched { result })
            | (Unlinked | NeedsHuman, LinkingEvent::Reconciled { result }) => (
                AutoLinked,
                Some(result.client_id.clone()),
                LinkingAttempt::new(AttemptStage::Auto, AttemptStatus::Success, at, &result.reason)
                    .with_confidence(result.confidence)
                    .with_client(result.client_id.clone()),
            ),
            (Unlinked | NeedsHuman, LinkingEvent::RosterEmpty) => (
                NeedsHuman,
                None,
                LinkingAttempt::new(
                    AttemptStage::Ai,
                    AttemptStatus::NoMatch,
                    at,
                    "no candidate clients in roster",
                ),
            ),
            (Unlinked | NeedsHuman, LinkingEvent::ArbitrationUnavailable { reason }) => (
                NeedsHuman,
                None,
                LinkingAttempt::new(AttemptStage::Ai, AttemptStatus::NoMatch, at, reason),
            ),
            (
                Unlinked | NeedsHuman,
                LinkingEvent::ArbitrationLinked { client_id, confidence, reason },
            ) => (
                AiLinked,
                Some(client_id.clone()),
                LinkingAttempt::new(AttemptStage::Ai, AttemptStatus::Success, at, reason)
                    .with_confidence(*confidence)
                    .with_client(client_id.clone()),
            ),
            (Unlinked | NeedsHuman, LinkingEvent::ArbitrationDeclined { confidence, reason }) => {
                let attempt =
                    LinkingAttempt::new(AttemptStage::Ai, AttemptStatus::NoMatch, at, reason);
                let attempt = match confidence {
                    Some(confidence) => attempt.with_confidence(*confidence),
                    None => attempt,
                };
                (NeedsHuman, None, attempt)
            }
            (Unlinked | NeedsHuman, LinkingEvent::ArbitrationFailed { reason }) => (
                NeedsHuman,
                None,
                LinkingAttempt::new(AttemptStage::Ai, AttemptStatus::Error, at, reason),
            ),
            (NeedsHuman, LinkingEvent::EscalationSent { message_id }) => {
                let reason = match message_id {
                    Some(id) => format!("escalation sent (message {id})"),
                    None => "escalation sent".to_string(),
                };
                (
                    NeedsHuman,
                    None,
                    LinkingAttempt::new(AttemptStage::Telegram, AttemptStatus::Success, at, reason),
                )
            }
            (NeedsHuman, LinkingEvent::EscalationFailed { error }) => (
                NeedsHuman,
                None,
                LinkingAttempt::new(AttemptStage::Telegram, AttemptStatus::Error, at, error),
            ),
            _ => return Err(invalid()),
        };

        Ok(LinkingTransition { document_id: document.id.clone(), from, to, client_id, attempt })
    }

    pub fn apply_with_audit<S>(
        &self,
        document: &LinkableDocument,
        event: &LinkingEvent,
        at: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<LinkingTransition, LinkingTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(document, event, at);
        match &result {
            Ok(transition) => {
                sink.emit(
                    AuditEvent::new(
                        Some(document.id.clone()),
                        audit,
                        event_name(transition),
                        category_for(transition.attempt.stage),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", transition.from.as_str())
                    .with_metadata("to", transition.to.as_str())
                    .with_metadata("event", event.name())
                    .with_metadata("attempt_status", transition.attempt.status.as_str()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        Some(document.id.clone()),
                        audit,
                        "linking.transition_rejected",
                        AuditCategory::Resolution,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("event", event.name())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

/// Applies a decided transition to an in-memory document.
pub fn commit(document: &mut LinkableDocument, transition: &LinkingTransition) {
    document.linking_status = transition.to;
    if let Some(client_id) = &transition.client_id {
        document.client_id = Some(client_id.clone());
    }
    document.last_link_attempt_at = Some(transition.attempt.timestamp);
    document.linking_history.push(transition.attempt.clone());
}

fn event_name(transition: &LinkingTransition) -> &'static str {
    match (transition.attempt.stage, transition.to) {
        (AttemptStage::Telegram, _) if transition.attempt.status == AttemptStatus::Success => {
            "escalation.sent"
        }
        (AttemptStage::Telegram, _) => "escalation.failed",
        (_, LinkingStatus::AutoLinked) => "linking.auto_linked",
        (_, LinkingStatus::AiLinked) => "linking.ai_linked",
        _ => "linking.needs_human",
    }
}

fn category_for(stage: AttemptStage) -> AuditCategory {
    match stage {
        AttemptStage::Auto => AuditCategory::Resolution,
        AttemptStage::Ai => AuditCategory::Arbitration,
        AttemptStage::Telegram => AuditCategory::Escalation,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::domain::attempt::{AttemptStage, AttemptStatus};
    use crate::domain::client::{ClientId, OwnerId};
    use crate::domain::document::{DocumentKind, LinkableDocument, LinkingStatus};
    use crate::linking::engine::{commit, LinkingStateMachine, LinkingTransitionError};
    use crate::linking::states::LinkingEvent;
    use crate::resolution::{MatchResult, MatchTier};

    fn document() -> LinkableDocument {
        LinkableDocument::new(
            "doc-1",
            OwnerId("owner-1".to_string()),
            DocumentKind::Transcript,
            "Kickoff",
            Utc::now(),
        )
    }

    fn exact_match() -> MatchResult {
        MatchResult {
            client_id: ClientId("c1".to_string()),
            confidence: 1.0,
            reason: "exact email match: john@acme.com".to_string(),
            tier: MatchTier::ExactEmail,
        }
    }

    #[test]
    fn deterministic_match_links_and_records_auto_success() {
        let machine = LinkingStateMachine::new();
        let mut doc = document();
        let transition = machine
            .apply(&doc, &LinkingEvent::DeterministicMatched { result: exact_match() }, Utc::now())
            .expect("transition");

        assert_eq!(transition.to, LinkingStatus::AutoLinked);
        assert!(transition.attempt.is(AttemptStage::Auto, AttemptStatus::Success));
        assert_eq!(transition.attempt.confidence, Some(1.0));

        commit(&mut doc, &transition);
        assert_eq!(doc.client_id, Some(ClientId("c1".to_string())));
        assert_eq!(doc.linking_history.len(), 1);
        assert_eq!(doc.last_link_attempt_at, Some(transition.attempt.timestamp));
    }

    #[test]
    fn linked_documents_reject_every_event() {
        let machine = LinkingStateMachine::new();
        let mut doc = document();
        let transition = machine
            .apply(&doc, &LinkingEvent::DeterministicMatched { result: exact_match() }, Utc::now())
            .expect("transition");
        commit(&mut doc, &transition);

        let events = [
            LinkingEvent::DeterministicMatched { result: exact_match() },
            LinkingEvent::RosterEmpty,
            LinkingEvent::ArbitrationFailed { reason: "timeout".to_string() },
            LinkingEvent::EscalationSent { message_id: None },
        ];
        for event in events {
            assert_eq!(
                machine.apply(&doc, &event, Utc::now()),
                Err(LinkingTransitionError::AlreadyLinked { client_id: ClientId("c1".to_string()) })
            );
        }
    }

    #[test]
    fn arbitration_outcomes_map_to_statuses_and_attempts() {
        let machine = LinkingStateMachine::new();
        let doc = document();

        let linked = machine
            .apply(
                &doc,
                &LinkingEvent::ArbitrationLinked {
                    client_id: ClientId("c2".to_string()),
                    confidence: 0.82,
                    reason: "mentions Acme".to_string(),
                },
                Utc::now(),
            )
            .expect("linked");
        assert_eq!(linked.to, LinkingStatus::AiLinked);
        assert_eq!(linked.client_id, Some(ClientId("c2".to_string())));

        let declined = machine
            .apply(
                &doc,
                &LinkingEvent::ArbitrationDeclined {
                    confidence: Some(0.6),
                    reason: "confidence 0.60 below threshold".to_string(),
                },
                Utc::now(),
            )
            .expect("declined");
        assert_eq!(declined.to, LinkingStatus::NeedsHuman);
        assert!(declined.attempt.is(AttemptStage::Ai, AttemptStatus::NoMatch));
        assert_eq!(declined.client_id, None);

        let failed = machine
            .apply(&doc, &LinkingEvent::ArbitrationFailed { reason: "HTTP 500".to_string() }, Utc::now())
            .expect("failed");
        assert!(failed.attempt.is(AttemptStage::Ai, AttemptStatus::Error));

        let empty = machine.apply(&doc, &LinkingEvent::RosterEmpty, Utc::now()).expect("empty");
        assert_eq!(empty.attempt.reason, "no candidate clients in roster");
    }

    #[test]
    fn escalation_is_only_valid_for_documents_needing_a_human() {
        let machine = LinkingStateMachine::new();
        let mut doc = document();

        assert!(matches!(
            machine.apply(&doc, &LinkingEvent::EscalationSent { message_id: None }, Utc::now()),
            Err(LinkingTransitionError::InvalidTransition { status: LinkingStatus::Unlinked, .. })
        ));

        let needs_human = machine.apply(&doc, &LinkingEvent::RosterEmpty, Utc::now()).expect("empty");
        commit(&mut doc, &needs_human);

        let sent = machine
            .apply(
                &doc,
                &LinkingEvent::EscalationSent { message_id: Some("42".to_string()) },
                Utc::now(),
            )
            .expect("sent");
        assert_eq!(sent.to, LinkingStatus::NeedsHuman);
        assert!(sent.attempt.is(AttemptStage::Telegram, AttemptStatus::Success));
    }

    #[test]
    fn attempt_timestamps_never_move_backwards() {
        let machine = LinkingStateMachine::new();
        let mut doc = document();
        let later = Utc::now() + Duration::minutes(5);
        let first = machine.apply(&doc, &LinkingEvent::RosterEmpty, later).expect("first");
        commit(&mut doc, &first);

        let earlier = later - Duration::minutes(10);
        let second = machine
            .apply(&doc, &LinkingEvent::EscalationFailed { error: "timeout".to_string() }, earlier)
            .expect("second");
        assert_eq!(second.attempt.timestamp, later);
    }

    #[test]
    fn apply_with_audit_emits_named_events() {
        let machine = LinkingStateMachine::new();
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new("req-1", "test");
        let doc = document();

        machine
            .apply_with_audit(
                &doc,
                &LinkingEvent::DeterministicMatched { result: exact_match() },
                Utc::now(),
                &sink,
                &context,
            )
            .expect("transition");
        let _ = machine.apply_with_audit(
            &doc,
            &LinkingEvent::EscalationSent { message_id: None },
            Utc::now(),
            &sink,
            &context,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "linking.auto_linked");
        assert_eq!(events[1].event_type, "linking.transition_rejected");
        assert_eq!(events[1].outcome, AuditOutcome::Rejected);
    }
}
