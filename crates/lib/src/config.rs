//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.qnabot/config.json`) and environment.
//! Secrets and endpoint coordinates may come from env so the file can be checked in.

use crate::qna::{QnaEndpoint, QnaMetadata, QnaOptions, DEFAULT_SCORE_THRESHOLD, DEFAULT_TOP};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reply used when the knowledge base has no answer for a message.
pub const DEFAULT_FALLBACK_ANSWER: &str = "No QnA Maker answers were found.";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (e.g. Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Knowledge base endpoint, query options, and fallback reply.
    #[serde(default)]
    pub qna: QnaConfig,
}

/// Gateway bind, port, and auth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3978).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Auth settings. When absent, defaults to no auth for loopback bind.
    #[serde(default)]
    pub auth: GatewayAuthConfig,
}

/// Gateway auth: token or none (loopback-only when none).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuthConfig {
    /// "none" = no shared secret (only safe when bind is loopback). "token" = require a bearer token on /api/messages.
    #[serde(default)]
    pub mode: GatewayAuthMode,

    /// Shared secret for /api/messages. Overridden by QNABOT_GATEWAY_TOKEN env.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayAuthMode {
    /// No auth; allow only when bind is loopback.
    #[default]
    None,

    /// Require `Authorization: Bearer <token>` to match configured token.
    Token,
}

fn default_gateway_port() -> u16 {
    3978
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            auth: GatewayAuthConfig::default(),
        }
    }
}

/// Per-channel config (e.g. Telegram bot token).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token). Used only when webhook_url is set.
    pub webhook_secret: Option<String>,
    /// Bot API base URL (default https://api.telegram.org); point at a local Bot API server if needed.
    pub api_base: Option<String>,
}

/// QnA Maker settings. Endpoint and options are handed to the client as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QnaConfig {
    #[serde(default)]
    pub endpoint: QnaEndpointConfig,

    #[serde(default)]
    pub options: QnaOptionsConfig,

    /// Sent when no answer clears the score threshold.
    #[serde(default = "default_fallback_answer")]
    pub fallback_answer: String,
}

impl Default for QnaConfig {
    fn default() -> Self {
        Self {
            endpoint: QnaEndpointConfig::default(),
            options: QnaOptionsConfig::default(),
            fallback_answer: default_fallback_answer(),
        }
    }
}

fn default_fallback_answer() -> String {
    DEFAULT_FALLBACK_ANSWER.to_string()
}

/// Knowledge base coordinates. Each field is overridden by its QNA_* env var when set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QnaEndpointConfig {
    /// Runtime host, e.g. `https://my-kb.azurewebsites.net/qnamaker`. Env: QNA_ENDPOINT_HOST.
    pub host: Option<String>,
    /// Env: QNA_KNOWLEDGE_BASE_ID.
    pub knowledge_base_id: Option<String>,
    /// Env: QNA_ENDPOINT_KEY.
    pub endpoint_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QnaOptionsConfig {
    /// Minimum normalised score (0.0–1.0) an answer needs to be returned. Default 0.3.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    /// Maximum number of answers requested. Default 1.
    #[serde(default = "default_top")]
    pub top: u32,
    /// Metadata filters applied by the service.
    #[serde(default)]
    pub strict_filters: Vec<QnaMetadata>,
    /// Per-request timeout in milliseconds. No timeout when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_score_threshold() -> f32 {
    DEFAULT_SCORE_THRESHOLD
}

fn default_top() -> u32 {
    DEFAULT_TOP
}

impl Default for QnaOptionsConfig {
    fn default() -> Self {
        Self {
            score_threshold: default_score_threshold(),
            top: default_top(),
            strict_filters: Vec::new(),
            timeout_ms: None,
        }
    }
}

/// Non-empty, trimmed env var value.
fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

pub(crate) fn config_non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the gateway token: env QNABOT_GATEWAY_TOKEN overrides config.
pub fn resolve_gateway_token(config: &Config) -> Option<String> {
    env_non_empty("QNABOT_GATEWAY_TOKEN")
        .or_else(|| config_non_empty(config.gateway.auth.token.as_ref()))
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    env_non_empty("TELEGRAM_BOT_TOKEN")
        .or_else(|| config_non_empty(config.channels.telegram.bot_token.as_ref()))
}

/// Resolve the knowledge base endpoint from env (QNA_ENDPOINT_HOST, QNA_KNOWLEDGE_BASE_ID,
/// QNA_ENDPOINT_KEY) with config as fallback. Missing fields resolve to empty strings;
/// the client rejects them at construction.
pub fn resolve_qna_endpoint(config: &Config) -> QnaEndpoint {
    let ep = &config.qna.endpoint;
    QnaEndpoint {
        host: env_non_empty("QNA_ENDPOINT_HOST")
            .or_else(|| config_non_empty(ep.host.as_ref()))
            .unwrap_or_default(),
        knowledge_base_id: env_non_empty("QNA_KNOWLEDGE_BASE_ID")
            .or_else(|| config_non_empty(ep.knowledge_base_id.as_ref()))
            .unwrap_or_default(),
        endpoint_key: env_non_empty("QNA_ENDPOINT_KEY")
            .or_else(|| config_non_empty(ep.endpoint_key.as_ref()))
            .unwrap_or_default(),
    }
}

pub fn resolve_qna_options(config: &Config) -> QnaOptions {
    let o = &config.qna.options;
    QnaOptions {
        score_threshold: o.score_threshold,
        top: o.top,
        strict_filters: o.strict_filters.clone(),
        timeout_ms: o.timeout_ms,
    }
}

/// Fallback reply; an empty configured value falls back to the default text.
pub fn resolve_fallback_answer(config: &Config) -> String {
    let s = config.qna.fallback_answer.trim();
    if s.is_empty() {
        DEFAULT_FALLBACK_ANSWER.to_string()
    } else {
        config.qna.fallback_answer.clone()
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("QNABOT_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".qnabot").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or QNABOT_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Run `f` with the given env vars set (`Some`) or removed (`None`), restoring the
/// previous values afterwards. Calls are serialised so tests in this crate that
/// read the override variables never observe each other's values.
#[cfg(test)]
pub(crate) fn with_env<R>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let saved: Vec<(String, Option<String>)> = vars
        .iter()
        .map(|(name, _)| (name.to_string(), std::env::var(name).ok()))
        .collect();
    for (name, value) in vars {
        match value {
            Some(v) => std::env::set_var(name, v),
            None => std::env::remove_var(name),
        }
    }
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
    for (name, value) in saved {
        match value {
            Some(v) => std::env::set_var(&name, v),
            None => std::env::remove_var(&name),
        }
    }
    match result {
        Ok(r) => r,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
