//! Tiered deterministic matcher.
//!
//! Tiers, in the order they are tried for each participant:
//!
//! | tier | rule | confidence |
//! |------|------|------------|
//! | 1 | normalized email equals a client's business email | 1.00 |
//! | 2 | raw domain shared with exactly one client | 0.95 |
//! | 3 | domain key shared with exactly one client | 0.85 |
//! | 4 | domain key shared by several clients, exactly one business key overlaps it | 0.75 |
//! | 5 | first client in roster order whose business key overlaps the domain key | 0.65 |
//!
//! Tiers 1 and 2 end the run immediately. Tiers 3–5 are collected across all
//! participants and the highest confidence wins; on equal confidence the
//! earlier participant is kept.

use serde::{Deserialize, Serialize};

use crate::domain::client::ClientId;
use crate::resolution::index::{CandidateIndex, CandidateMeta};
use crate::resolution::normalize::{domain_key, extract_domain, keys_overlap, normalize_email};

pub const EXACT_EMAIL_CONFIDENCE: f64 = 1.0;
pub const UNIQUE_DOMAIN_CONFIDENCE: f64 = 0.95;
pub const UNIQUE_DOMAIN_KEY_CONFIDENCE: f64 = 0.85;
pub const NARROWED_DOMAIN_KEY_CONFIDENCE: f64 = 0.75;
pub const FUZZY_BUSINESS_KEY_CONFIDENCE: f64 = 0.65;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    ExactEmail,
    UniqueDomain,
    UniqueDomainKey,
    NarrowedDomainKey,
    FuzzyBusinessKey,
    Title,
}

impl MatchTier {
    pub fn confidence(&self) -> f64 {
        match self {
            Self::ExactEmail => EXACT_EMAIL_CONFIDENCE,
            Self::UniqueDomain => UNIQUE_DOMAIN_CONFIDENCE,
            Self::UniqueDomainKey => UNIQUE_DOMAIN_KEY_CONFIDENCE,
            Self::NarrowedDomainKey => NARROWED_DOMAIN_KEY_CONFIDENCE,
            Self::FuzzyBusinessKey => FUZZY_BUSINESS_KEY_CONFIDENCE,
            Self::Title => crate::reconcile::TITLE_MATCH_CONFIDENCE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub client_id: ClientId,
    pub confidence: f64,
    pub reason: String,
    pub tier: MatchTier,
}

impl MatchResult {
    fn new(candidate: &CandidateMeta, tier: MatchTier, reason: String) -> Self {
        Self { client_id: candidate.client_id.clone(), confidence: tier.confidence(), reason, tier }
    }
}

/// Find the best client for a document's participants.
///
/// The owner's own address is never matched. Pure: identical inputs always
/// produce identical output.
pub fn match_participants(
    owner_email: &str,
    participant_emails: &[String],
    index: &CandidateIndex,
) -> Option<MatchResult> {
    if index.is_empty() {
        return None;
    }

    let owner_email = normalize_email(owner_email);
    let mut best: Option<MatchResult> = None;

    for raw in participant_emails {
        let email = normalize_email(raw);
        if email.is_empty() || email == owner_email {
            continue;
        }

        if let Some(candidate) = index.by_email(&email) {
            return Some(MatchResult::new(
                candidate,
                MatchTier::ExactEmail,
                format!("participant {email} is the client's business email"),
            ));
        }

        let Some(domain) = extract_domain(&email) else {
            continue;
        };

        if let [candidate] = index.by_domain(&domain).as_slice() {
            return Some(MatchResult::new(
                candidate,
                MatchTier::UniqueDomain,
                format!("participant domain {domain} belongs to exactly one client"),
            ));
        }

        let key = domain_key(&domain);
        if key.is_empty() {
            continue;
        }

        if let Some(found) = match_domain_key(&key, index) {
            if best.as_ref().is_none_or(|current| found.confidence > current.confidence) {
                best = Some(found);
            }
        }
    }

    best
}

/// Tiers 3–5 for a single participant's domain key.
fn match_domain_key(key: &str, index: &CandidateIndex) -> Option<MatchResult> {
    let shared = index.by_domain_key(key);

    match shared.as_slice() {
        [candidate] => {
            return Some(MatchResult::new(
                candidate,
                MatchTier::UniqueDomainKey,
                format!("domain key `{key}` belongs to exactly one client"),
            ));
        }
        [] => {}
        several => {
            let narrowed: Vec<&&CandidateMeta> = several
                .iter()
                .filter(|candidate| {
                    candidate
                        .business_key
                        .as_deref()
                        .is_some_and(|business| keys_overlap(key, business))
                })
                .collect();
            if let [candidate] = narrowed.as_slice() {
                return Some(MatchResult::new(
                    candidate,
                    MatchTier::NarrowedDomainKey,
                    format!(
                        "domain key `{key}` is shared by {} clients; one business name matches",
                        several.len()
                    ),
                ));
            }
        }
    }

    // First hit in roster order wins; later overlapping clients are not considered.
    index
        .candidates()
        .iter()
        .find(|candidate| {
            candidate.business_key.as_deref().is_some_and(|business| keys_overlap(key, business))
        })
        .map(|candidate| {
            MatchResult::new(
                candidate,
                MatchTier::FuzzyBusinessKey,
                format!(
                    "business name key `{}` overlaps domain key `{key}`",
                    candidate.business_key.as_deref().unwrap_or_default()
                ),
            )
        })
}
