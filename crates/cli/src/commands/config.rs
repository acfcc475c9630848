use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rosterlink_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct ConfigRow {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl ConfigRow {
    fn new(key: &'static str, env_keys: &'static [&'static str], value: impl Into<String>) -> Self {
        Self { key, env_keys, value: value.into() }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for row in rows(&config) {
        let source = field_source(
            row.key,
            row.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(row.key, &row.value, source));
    }

    lines.join("\n")
}

fn rows(config: &AppConfig) -> Vec<ConfigRow> {
    vec![
        ConfigRow::new("database.url", &["ROSTERLINK_DATABASE_URL"], &config.database.url),
        ConfigRow::new(
            "database.max_connections",
            &["ROSTERLINK_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        ConfigRow::new(
            "database.timeout_secs",
            &["ROSTERLINK_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        ConfigRow::new(
            "llm.provider",
            &["ROSTERLINK_LLM_PROVIDER"],
            format!("{:?}", config.llm.provider),
        ),
        ConfigRow::new("llm.model", &["ROSTERLINK_LLM_MODEL"], &config.llm.model),
        ConfigRow::new(
            "llm.base_url",
            &["ROSTERLINK_LLM_BASE_URL"],
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
        ),
        ConfigRow::new("llm.api_key", &["ROSTERLINK_LLM_API_KEY"], redact(&config.llm.api_key)),
        ConfigRow::new(
            "llm.timeout_secs",
            &["ROSTERLINK_LLM_TIMEOUT_SECS"],
            config.llm.timeout_secs.to_string(),
        ),
        ConfigRow::new(
            "escalation.bot_token",
            &["ROSTERLINK_ESCALATION_BOT_TOKEN"],
            redact_bot_token(&config.escalation.bot_token),
        ),
        ConfigRow::new(
            "escalation.chat_id",
            &["ROSTERLINK_ESCALATION_CHAT_ID"],
            config.escalation.chat_id.as_deref().unwrap_or("<unset>"),
        ),
        ConfigRow::new(
            "escalation.api_base_url",
            &["ROSTERLINK_ESCALATION_API_BASE_URL"],
            &config.escalation.api_base_url,
        ),
        ConfigRow::new(
            "escalation.app_base_url",
            &["ROSTERLINK_ESCALATION_APP_BASE_URL"],
            config.escalation.app_base_url.as_deref().unwrap_or("<unset>"),
        ),
        ConfigRow::new(
            "server.bind_address",
            &["ROSTERLINK_SERVER_BIND_ADDRESS"],
            &config.server.bind_address,
        ),
        ConfigRow::new("server.port", &["ROSTERLINK_SERVER_PORT"], config.server.port.to_string()),
        ConfigRow::new(
            "reconcile.default_limit",
            &["ROSTERLINK_RECONCILE_DEFAULT_LIMIT"],
            config.reconcile.default_limit.to_string(),
        ),
        ConfigRow::new(
            "reconcile.max_limit",
            &["ROSTERLINK_RECONCILE_MAX_LIMIT"],
            config.reconcile.max_limit.to_string(),
        ),
        ConfigRow::new(
            "logging.level",
            &["ROSTERLINK_LOGGING_LEVEL", "ROSTERLINK_LOG_LEVEL"],
            &config.logging.level,
        ),
        ConfigRow::new(
            "logging.format",
            &["ROSTERLINK_LOGGING_FORMAT", "ROSTERLINK_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("rosterlink.toml"), PathBuf::from("config/rosterlink.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if config_file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact(secret: &Option<SecretString>) -> &'static str {
    if secret.is_some() {
        "<redacted>"
    } else {
        "<unset>"
    }
}

/// Bot tokens look like `<bot id>:<secret>`; the bot id is safe to show.
fn redact_bot_token(token: &Option<SecretString>) -> String {
    let Some(token) = token else {
        return "<unset>".to_string();
    };

    match token.expose_secret().trim().split_once(':') {
        Some((bot_id, _)) if !bot_id.is_empty() => format!("{bot_id}:***"),
        _ => "<redacted>".to_string(),
    }
}
