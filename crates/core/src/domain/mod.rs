pub mod attempt;
pub mod client;
pub mod document;
pub mod escalation;
