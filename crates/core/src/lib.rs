pub mod arbitration;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod escalation;
pub mod linking;
pub mod reconcile;
pub mod resolution;

pub use arbitration::{
    parse_arbitration_reply, validate_arbitration, ArbitrationOutcome, ArbitrationReply,
    ArbitrationRequest, Arbitrator,
};
pub use domain::attempt::{AttemptStage, AttemptStatus, LinkingAttempt};
pub use domain::client::{AccountOwner, ClientId, ClientRecord, OwnerId};
pub use domain::document::{DocumentId, DocumentKind, LinkableDocument, LinkingStatus};
pub use domain::escalation::{ClaimState, EscalationClaim};
pub use errors::{InterfaceError, LinkingError};
pub use escalation::{
    escalation_already_sent, EscalationAlert, EscalationChannel, EscalationError,
    EscalationOutcome, EscalationReceipt,
};
pub use linking::{LinkingEvent, LinkingStateMachine, LinkingTransition, LinkingTransitionError};
pub use reconcile::{
    plan_reconciliation, reconcile, LinkApplier, ReconcileMode, ReconcileStrategy,
    ReconciliationReport,
};
pub use resolution::{match_participants, CandidateIndex, MatchResult, MatchTier};
