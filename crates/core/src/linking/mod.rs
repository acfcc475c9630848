pub mod engine;
pub mod states;

pub use engine::{commit, LinkingStateMachine, LinkingTransitionError};
pub use states::{LinkingEvent, LinkingTransition};
