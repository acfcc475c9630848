use std::collections::HashMap;

use crate::domain::client::{ClientId, ClientRecord};
use crate::resolution::normalize::{business_key, domain_key, extract_domain, normalize_email};

/// Per-run view of one client, derived from its business email and name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateMeta {
    pub client_id: ClientId,
    pub normalized_email: Option<String>,
    pub domain: Option<String>,
    pub domain_key: Option<String>,
    pub business_key: Option<String>,
}

impl CandidateMeta {
    pub fn from_client(client: &ClientRecord) -> Self {
        let normalized_email = client
            .business_email
            .as_deref()
            .map(normalize_email)
            .filter(|email| !email.is_empty());
        let domain = normalized_email.as_deref().and_then(extract_domain);
        let domain_key =
            domain.as_deref().map(domain_key).filter(|key| !key.is_empty());
        let business_key = client.business_name.as_deref().and_then(business_key);

        Self { client_id: client.id.clone(), normalized_email, domain, domain_key, business_key }
    }
}

/// Lookup structures over one owner's roster. Built fresh for every
/// resolution run and never cached, so roster edits are always visible.
///
/// Positions stored in the maps index into `candidates`, which keeps roster
/// order; that order is what makes the fuzzy fallback deterministic.
#[derive(Clone, Debug, Default)]
pub struct CandidateIndex {
    candidates: Vec<CandidateMeta>,
    by_email: HashMap<String, usize>,
    by_domain: HashMap<String, Vec<usize>>,
    by_domain_key: HashMap<String, Vec<usize>>,
}

impl CandidateIndex {
    pub fn build(roster: &[ClientRecord]) -> Self {
        let mut index = Self::default();

        for client in roster {
            let meta = CandidateMeta::from_client(client);
            let position = index.candidates.len();

            if let Some(email) = &meta.normalized_email {
                // Duplicate emails: the later roster entry wins.
                index.by_email.insert(email.clone(), position);
            }
            if let Some(domain) = &meta.domain {
                index.by_domain.entry(domain.clone()).or_default().push(position);
            }
            if let Some(key) = &meta.domain_key {
                index.by_domain_key.entry(key.clone()).or_default().push(position);
            }

            index.candidates.push(meta);
        }

        index
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates in roster order.
    pub fn candidates(&self) -> &[CandidateMeta] {
        &self.candidates
    }

    pub fn by_email(&self, normalized_email: &str) -> Option<&CandidateMeta> {
        self.by_email.get(normalized_email).map(|position| &self.candidates[*position])
    }

    pub fn by_domain(&self, domain: &str) -> Vec<&CandidateMeta> {
        self.lookup(self.by_domain.get(domain))
    }

    pub fn by_domain_key(&self, key: &str) -> Vec<&CandidateMeta> {
        self.lookup(self.by_domain_key.get(key))
    }

    fn lookup(&self, positions: Option<&Vec<usize>>) -> Vec<&CandidateMeta> {
        positions
            .map(|positions| positions.iter().map(|position| &self.candidates[*position]).collect())
            .unwrap_or_default()
    }
}
