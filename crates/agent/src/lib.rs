//! Model-assisted arbitration for documents the deterministic matcher could
//! not place.
//!
//! The model only ever proposes. Its reply is decoded and validated against
//! the offered candidates by `rosterlink_core::arbitration` before anything
//! is linked; transport problems and timeouts become `Failed` outcomes and
//! never escape as errors.

pub mod arbitrator;
pub mod llm;
pub mod prompt;

pub use arbitrator::LlmArbitrator;
pub use llm::{LlmClient, LlmError, OpenAiCompatibleClient, ScriptedLlmClient};
