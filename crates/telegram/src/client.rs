use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use rosterlink_core::config::EscalationConfig;
use rosterlink_core::escalation::{
    EscalationAlert, EscalationChannel, EscalationError, EscalationReceipt,
};

use crate::message::render_alert;

const PARSE_MODE: &str = "Markdown";

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram is not configured: {0}")]
    NotConfigured(&'static str),
    #[error("telegram request failed: {0}")]
    Http(String),
    #[error("telegram api error: {0}")]
    Api(String),
    #[error("telegram request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<TelegramError> for EscalationError {
    fn from(error: TelegramError) -> Self {
        match error {
            TelegramError::NotConfigured(_) => Self::NotConfigured(error.to_string()),
            TelegramError::Http(_) | TelegramError::Timeout(_) => Self::Network(error.to_string()),
            TelegramError::Api(_) => Self::Rejected(error.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<SentMessage>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Thin bot API client; only `sendMessage` is needed.
pub struct TelegramClient {
    http: reqwest::Client,
    api_base_url: String,
    bot_token: SecretString,
    chat_id: String,
    timeout: Duration,
}

impl TelegramClient {
    pub fn from_config(config: &EscalationConfig) -> Result<Self, TelegramError> {
        let bot_token = config
            .bot_token
            .clone()
            .filter(|token| !token.expose_secret().trim().is_empty())
            .ok_or(TelegramError::NotConfigured("bot_token is missing"))?;
        let chat_id = config
            .chat_id
            .clone()
            .filter(|chat_id| !chat_id.trim().is_empty())
            .ok_or(TelegramError::NotConfigured("chat_id is missing"))?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TelegramError::Http(error.to_string()))?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
            timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base_url, self.bot_token.expose_secret())
    }

    /// Returns the id Telegram assigned to the message.
    pub async fn send_message(&self, text: &str) -> Result<i64, TelegramError> {
        let body = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: PARSE_MODE,
            disable_web_page_preview: true,
        };

        let response =
            self.http.post(self.method_url("sendMessage")).json(&body).send().await.map_err(
                |error| {
                    if error.is_timeout() {
                        TelegramError::Timeout(self.timeout)
                    } else {
                        // reqwest errors embed the URL, which carries the token.
                        TelegramError::Http(error.without_url().to_string())
                    }
                },
            )?;

        let status = response.status();
        let payload = response
            .text()
            .await
            .map_err(|error| TelegramError::Http(error.without_url().to_string()))?;
        decode_send_response(status.as_u16(), &payload)
    }
}

fn decode_send_response(status: u16, payload: &str) -> Result<i64, TelegramError> {
    let parsed: ApiResponse = serde_json::from_str(payload).map_err(|_| {
        TelegramError::Api(format!("HTTP {status} with undecodable body"))
    })?;

    match (parsed.ok, parsed.result) {
        (true, Some(message)) => Ok(message.message_id),
        (true, None) => Err(TelegramError::Api("response is missing the sent message".to_string())),
        (false, _) => Err(TelegramError::Api(format!(
            "HTTP {status}: {}",
            parsed.description.unwrap_or_else(|| "no description".to_string())
        ))),
    }
}

/// [`EscalationChannel`] that posts alerts to one Telegram chat.
pub struct TelegramEscalationChannel {
    client: TelegramClient,
    app_base_url: Option<String>,
}

impl TelegramEscalationChannel {
    pub fn new(client: TelegramClient, app_base_url: Option<String>) -> Self {
        Self { client, app_base_url }
    }

    pub fn from_config(config: &EscalationConfig) -> Result<Self, TelegramError> {
        Ok(Self::new(TelegramClient::from_config(config)?, config.app_base_url.clone()))
    }
}

#[async_trait]
impl EscalationChannel for TelegramEscalationChannel {
    async fn send(&self, alert: &EscalationAlert) -> Result<EscalationReceipt, EscalationError> {
        let text = render_alert(alert, self.app_base_url.as_deref());
        match self.client.send_message(&text).await {
            Ok(message_id) => {
                info!(
                    event_name = "escalation.telegram.sent",
                    document_id = %alert.document_id,
                    message_id,
                    "escalation alert delivered"
                );
                Ok(EscalationReceipt { message_id: Some(message_id.to_string()) })
            }
            Err(error) => {
                warn!(
                    event_name = "escalation.telegram.failed",
                    document_id = %alert.document_id,
                    error = %error,
                    "escalation alert not delivered"
                );
                Err(error.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use rosterlink_core::config::EscalationConfig;
    use rosterlink_core::escalation::EscalationError;

    use super::{decode_send_response, TelegramClient, TelegramError};

    fn config(token: Option<&str>, chat_id: Option<&str>) -> EscalationConfig {
        EscalationConfig {
            bot_token: token.map(|token| SecretString::from(token.to_string())),
            chat_id: chat_id.map(str::to_string),
            api_base_url: "https://api.telegram.org/".to_string(),
            app_base_url: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn client_requires_token_and_chat() {
        assert!(matches!(
            TelegramClient::from_config(&config(None, Some("-100"))),
            Err(TelegramError::NotConfigured(_))
        ));
        assert!(matches!(
            TelegramClient::from_config(&config(Some("123:abc"), Some("  "))),
            Err(TelegramError::NotConfigured(_))
        ));

        let client =
            TelegramClient::from_config(&config(Some("123:abc"), Some("-100"))).expect("client");
        assert_eq!(
            client.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn decodes_success_and_api_errors() {
        assert_eq!(
            decode_send_response(200, r#"{"ok":true,"result":{"message_id":812,"chat":{"id":-100}}}"#)
                .expect("message id"),
            812
        );

        let rejected = decode_send_response(
            400,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        );
        assert!(matches!(rejected, Err(TelegramError::Api(ref message)) if message.contains("chat not found")));

        assert!(matches!(decode_send_response(502, "<html>"), Err(TelegramError::Api(_))));
    }

    #[test]
    fn errors_map_onto_escalation_taxonomy() {
        assert!(matches!(
            EscalationError::from(TelegramError::Http("reset".into())),
            EscalationError::Network(_)
        ));
        assert!(matches!(
            EscalationError::from(TelegramError::Api("blocked".into())),
            EscalationError::Rejected(_)
        ));
        assert!(matches!(
            EscalationError::from(TelegramError::NotConfigured("chat_id is missing")),
            EscalationError::NotConfigured(_)
        ));
    }
}
