//! Contract for the model-assisted fallback tier.
//!
//! The model never decides on its own: its reply is decoded into an
//! [`ArbitrationReply`] immediately, then [`validate_arbitration`] checks it
//! against the candidates that were actually offered. Anything that fails is
//! a non-fatal "no link".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::client::{ClientId, ClientRecord};
use crate::domain::document::{DocumentId, DocumentKind, LinkableDocument};

/// Minimum model confidence for a link to be accepted.
pub const AI_LINK_THRESHOLD: f64 = 0.75;
pub const MAX_PROMPT_CANDIDATES: usize = 200;
pub const MAX_EXCERPT_CHARS: usize = 4_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSummary {
    pub id: ClientId,
    pub business_name: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
    pub status: Option<String>,
}

impl From<&ClientRecord> for CandidateSummary {
    fn from(client: &ClientRecord) -> Self {
        Self {
            id: client.id.clone(),
            business_name: client.business_name.clone(),
            email: client.business_email.clone(),
            contact: client.contact_name.clone(),
            status: client.status.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub kind: DocumentKind,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub participants: Vec<String>,
    pub excerpt: Option<String>,
}

/// Everything the model is allowed to see for one document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrationRequest {
    pub owner_email: String,
    pub document: DocumentSummary,
    pub candidates: Vec<CandidateSummary>,
}

impl ArbitrationRequest {
    /// Build a bounded request. Only transcripts contribute a content excerpt.
    pub fn build(owner_email: &str, document: &LinkableDocument, roster: &[ClientRecord]) -> Self {
        let excerpt = match document.kind {
            DocumentKind::Transcript => document
                .content
                .as_deref()
                .map(str::trim)
                .filter(|content| !content.is_empty())
                .map(|content| truncate_chars(content, MAX_EXCERPT_CHARS)),
            DocumentKind::FormResponse => None,
        };

        Self {
            owner_email: owner_email.to_string(),
            document: DocumentSummary {
                id: document.id.clone(),
                kind: document.kind,
                title: document.title.clone(),
                timestamp: document.timestamp,
                participants: document.participant_emails.clone(),
                excerpt,
            },
            candidates: roster
                .iter()
                .take(MAX_PROMPT_CANDIDATES)
                .map(CandidateSummary::from)
                .collect(),
        }
    }

    pub fn offers(&self, client_id: &str) -> bool {
        self.candidates.iter().any(|candidate| candidate.id.0 == client_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Link,
    NoLink,
}

/// Decoded model reply, before candidate-membership checks.
#[derive(Clone, Debug, PartialEq)]
pub enum ArbitrationReply {
    Valid { decision: Decision, client_id: Option<String>, confidence: f64, reason: String },
    Invalid { reason: String },
}

/// What the fallback tier concluded. `Failed` is reserved for transport
/// problems (network, timeout, HTTP status) and is recorded as an `error`
/// attempt; everything else is `no_match`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ArbitrationOutcome {
    Linked { client_id: ClientId, confidence: f64, reason: String },
    NoLink { confidence: Option<f64>, reason: String },
    Failed { reason: String },
}

#[async_trait]
pub trait Arbitrator: Send + Sync {
    /// Must not return errors for model or transport failures; those fold
    /// into [`ArbitrationOutcome::NoLink`] or [`ArbitrationOutcome::Failed`].
    async fn arbitrate(&self, request: &ArbitrationRequest) -> ArbitrationOutcome;
}

#[derive(Debug, Deserialize)]
struct RawReply {
    decision: Option<String>,
    #[serde(rename = "clientId", alias = "client_id", default)]
    client_id: Option<String>,
    confidence: Option<f64>,
    #[serde(default)]
    reason: Option<String>,
}

pub fn parse_arbitration_reply(text: &str) -> ArbitrationReply {
    let Some(json) = extract_first_json_object(text) else {
        return ArbitrationReply::Invalid { reason: "model reply contained no JSON object".into() };
    };

    let raw = match serde_json::from_str::<RawReply>(json) {
        Ok(raw) => raw,
        Err(error) => {
            return ArbitrationReply::Invalid {
                reason: format!("model reply did not match the response schema: {error}"),
            }
        }
    };

    let decision = match raw.decision.as_deref().map(str::trim) {
        Some("link") => Decision::Link,
        Some("no_link") => Decision::NoLink,
        Some(other) => {
            return ArbitrationReply::Invalid { reason: format!("unknown decision `{other}`") }
        }
        None => return ArbitrationReply::Invalid { reason: "decision is missing".into() },
    };

    let Some(confidence) = raw.confidence else {
        return ArbitrationReply::Invalid { reason: "confidence is missing".into() };
    };

    ArbitrationReply::Valid {
        decision,
        client_id: raw.client_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()),
        confidence: confidence.clamp(0.0, 1.0),
        reason: raw.reason.unwrap_or_default(),
    }
}

/// Accept a link only when the reply is valid, says `link`, names a client
/// that was offered, and is confident enough.
pub fn validate_arbitration(
    reply: ArbitrationReply,
    request: &ArbitrationRequest,
) -> ArbitrationOutcome {
    let (decision, client_id, confidence, reason) = match reply {
        ArbitrationReply::Invalid { reason } => {
            return ArbitrationOutcome::NoLink { confidence: None, reason }
        }
        ArbitrationReply::Valid { decision, client_id, confidence, reason } => {
            (decision, client_id, confidence, reason)
        }
    };

    if decision == Decision::NoLink {
        let reason = if reason.is_empty() { "model declined to link".to_string() } else { reason };
        return ArbitrationOutcome::NoLink { confidence: Some(confidence), reason };
    }

    let Some(client_id) = client_id else {
        return ArbitrationOutcome::NoLink {
            confidence: Some(confidence),
            reason: "model chose link without a clientId".to_string(),
        };
    };

    if !request.offers(&client_id) {
        return ArbitrationOutcome::NoLink {
            confidence: Some(confidence),
            reason: format!("model named client `{client_id}` which was not a candidate"),
        };
    }

    if confidence < AI_LINK_THRESHOLD {
        return ArbitrationOutcome::NoLink {
            confidence: Some(confidence),
            reason: format!(
                "model confidence {confidence:.2} is below the {AI_LINK_THRESHOLD:.2} threshold"
            ),
        };
    }

    ArbitrationOutcome::Linked { client_id: ClientId(client_id), confidence, reason }
}

/// Find the first complete `{...}` in free text, skipping braces inside
/// JSON strings.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0_i32;
    let mut in_string = false;
    let mut escape = false;

    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if escape {
            escape = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escape = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

pub(crate) fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &value[..cut]),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::client::{ClientRecord, OwnerId};
    use crate::domain::document::{DocumentKind, LinkableDocument};

    use super::{
        extract_first_json_object, parse_arbitration_reply, validate_arbitration,
        ArbitrationOutcome, ArbitrationReply, ArbitrationRequest, Decision, MAX_EXCERPT_CHARS,
    };

    fn owner() -> OwnerId {
        OwnerId("owner-1".to_string())
    }

    fn request() -> ArbitrationRequest {
        let document =
            LinkableDocument::new("doc-1", owner(), DocumentKind::Transcript, "Kickoff", Utc::now())
                .with_participants(["guest@gmail.com"])
                .with_content("We discussed the Best Studio rebrand.");
        let roster = vec![
            ClientRecord::new("c-1", owner()).with_name("Best Studio"),
            ClientRecord::new("c-2", owner()).with_name("Globex"),
        ];
        ArbitrationRequest::build("owner@acme.com", &document, &roster)
    }

    #[test]
    fn extracts_first_object_from_fenced_reply() {
        let text = "Sure!\n```json\n{\"decision\":\"link\",\"reason\":\"a {brace} \\\"q\\\"\"}\n```\n{}";
        assert_eq!(
            extract_first_json_object(text),
            Some("{\"decision\":\"link\",\"reason\":\"a {brace} \\\"q\\\"\"}")
        );
        assert_eq!(extract_first_json_object("no json here"), None);
        assert_eq!(extract_first_json_object("{\"unterminated\": true"), None);
    }

    #[test]
    fn parses_a_well_formed_link_reply() {
        let reply = parse_arbitration_reply(
            r#"{"decision":"link","clientId":"c-1","confidence":0.9,"reason":"mentioned by name"}"#,
        );
        assert_eq!(
            reply,
            ArbitrationReply::Valid {
                decision: Decision::Link,
                client_id: Some("c-1".to_string()),
                confidence: 0.9,
                reason: "mentioned by name".to_string(),
            }
        );
    }

    #[test]
    fn malformed_or_incomplete_replies_are_invalid() {
        for text in [
            "not json",
            r#"{"decision":"maybe","clientId":"c-1","confidence":0.9,"reason":""}"#,
            r#"{"clientId":"c-1","confidence":0.9,"reason":""}"#,
            r#"{"decision":"link","clientId":"c-1","reason":""}"#,
            r#"{"decision":"link","clientId":"c-1","confidence":"high","reason":""}"#,
        ] {
            assert!(
                matches!(parse_arbitration_reply(text), ArbitrationReply::Invalid { .. }),
                "expected invalid reply for {text}"
            );
        }
    }

    #[test]
    fn confident_link_to_offered_candidate_is_accepted() {
        let outcome = validate_arbitration(
            parse_arbitration_reply(
                r#"{"decision":"link","clientId":"c-1","confidence":0.82,"reason":"rebrand"}"#,
            ),
            &request(),
        );
        assert!(matches!(
            outcome,
            ArbitrationOutcome::Linked { ref client_id, confidence, .. }
                if client_id.0 == "c-1" && confidence == 0.82
        ));
    }

    #[test]
    fn fabricated_client_id_is_rejected_regardless_of_confidence() {
        let outcome = validate_arbitration(
            parse_arbitration_reply(
                r#"{"decision":"link","clientId":"c-999","confidence":1.0,"reason":"sure"}"#,
            ),
            &request(),
        );
        assert!(matches!(outcome, ArbitrationOutcome::NoLink { .. }));
    }

    #[test]
    fn low_confidence_and_no_link_decisions_do_not_link() {
        let low = validate_arbitration(
            parse_arbitration_reply(
                r#"{"decision":"link","clientId":"c-1","confidence":0.74,"reason":"guess"}"#,
            ),
            &request(),
        );
        assert!(matches!(low, ArbitrationOutcome::NoLink { confidence: Some(c), .. } if c == 0.74));

        let declined = validate_arbitration(
            parse_arbitration_reply(
                r#"{"decision":"no_link","clientId":null,"confidence":0.3,"reason":"unclear"}"#,
            ),
            &request(),
        );
        assert!(matches!(declined, ArbitrationOutcome::NoLink { ref reason, .. } if reason == "unclear"));
    }

    #[test]
    fn confidence_above_one_is_clamped_before_threshold_check() {
        let outcome = validate_arbitration(
            parse_arbitration_reply(
                r#"{"decision":"link","clientId":"c-2","confidence":7,"reason":"x"}"#,
            ),
            &request(),
        );
        assert!(matches!(outcome, ArbitrationOutcome::Linked { confidence, .. } if confidence == 1.0));
    }

    #[test]
    fn request_is_bounded_and_only_transcripts_carry_an_excerpt() {
        let long = "x".repeat(MAX_EXCERPT_CHARS + 50);
        let transcript =
            LinkableDocument::new("doc-2", owner(), DocumentKind::Transcript, "Call", Utc::now())
                .with_content(long.clone());
        let built = ArbitrationRequest::build("owner@acme.com", &transcript, &[]);
        let excerpt = built.document.excerpt.expect("transcript excerpt");
        assert_eq!(excerpt.chars().count(), MAX_EXCERPT_CHARS + 1);

        let form =
            LinkableDocument::new("doc-3", owner(), DocumentKind::FormResponse, "Intake", Utc::now())
                .with_content(long);
        assert_eq!(ArbitrationRequest::build("owner@acme.com", &form, &[]).document.excerpt, None);
    }
}
