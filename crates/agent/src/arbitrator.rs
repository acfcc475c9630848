use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use rosterlink_core::arbitration::{
    parse_arbitration_reply, validate_arbitration, ArbitrationOutcome, ArbitrationRequest,
    Arbitrator,
};
use rosterlink_core::config::LlmConfig;

use crate::llm::{LlmClient, LlmError, OpenAiCompatibleClient};
use crate::prompt::{render_user_prompt, SYSTEM_PROMPT};

/// Model-backed [`Arbitrator`]. One request per document, bounded by a
/// timeout; every failure folds into an outcome rather than an error.
pub struct LlmArbitrator {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl LlmArbitrator {
    pub fn new(client: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = OpenAiCompatibleClient::from_config(config)?;
        // The outer bound leaves the HTTP client's own timeout room to fire first.
        let timeout = Duration::from_secs(config.timeout_secs.saturating_add(1));
        Ok(Self::new(Arc::new(client), timeout))
    }
}

#[async_trait]
impl Arbitrator for LlmArbitrator {
    async fn arbitrate(&self, request: &ArbitrationRequest) -> ArbitrationOutcome {
        let user = render_user_prompt(request);
        let document_id = request.document.id.0.as_str();

        let reply =
            match tokio::time::timeout(self.timeout, self.client.complete(SYSTEM_PROMPT, &user))
                .await
            {
                Ok(reply) => reply,
                Err(_) => Err(LlmError::Timeout(self.timeout)),
            };

        let outcome = match reply {
            Ok(text) => validate_arbitration(parse_arbitration_reply(&text), request),
            Err(error) if error.is_transport() => {
                ArbitrationOutcome::Failed { reason: error.to_string() }
            }
            Err(error) => {
                ArbitrationOutcome::NoLink { confidence: None, reason: error.to_string() }
            }
        };

        match &outcome {
            ArbitrationOutcome::Linked { client_id, confidence, .. } => info!(
                event_name = "arbitration.linked",
                document_id,
                client_id = %client_id,
                confidence,
                "model linked document"
            ),
            ArbitrationOutcome::NoLink { reason, .. } => info!(
                event_name = "arbitration.no_link",
                document_id,
                reason = %reason,
                "model did not link document"
            ),
            ArbitrationOutcome::Failed { reason } => warn!(
                event_name = "arbitration.failed",
                document_id,
                reason = %reason,
                "model request failed"
            ),
        }

        outcome
    }
}
