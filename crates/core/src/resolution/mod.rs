//! Deterministic entity resolution: key normalization, the per-run candidate
//! index and the tiered matcher.

pub mod index;
pub mod matcher;
pub mod normalize;

pub use index::{CandidateIndex, CandidateMeta};
pub use matcher::{match_participants, MatchResult, MatchTier};
