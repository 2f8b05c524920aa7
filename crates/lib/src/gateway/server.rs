//! Gateway HTTP server (single port).

use crate::channels::{ChannelHandle, ChannelRegistry, InboundEvent, TelegramChannel, TelegramUpdate};
use crate::config::{self, Config};
use crate::gateway::protocol::{ActivitiesResponse, Activity, ReplyActivity};
use crate::init;
use crate::qna::QnaMakerClient;
use crate::relay::{Relay, TurnError};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Reply sent to a channel conversation when a turn fails (the relay itself sends nothing).
pub const GENERIC_ERROR_REPLY: &str = "The bot encountered an error or bug.";

const INBOUND_QUEUE_CAPACITY: usize = 64;

/// Shared state for the gateway (config, relay, channels).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// When Some, /api/messages must carry `Authorization: Bearer <token>` matching this.
    pub required_token: Option<String>,
    pub relay: Arc<Relay>,
    pub knowledge_base_id: String,
    /// In-process channel connector tasks; awaited during graceful shutdown.
    pub channel_tasks: Arc<tokio::sync::RwLock<Vec<JoinHandle<()>>>>,
    /// Sender for inbound channel events (e.g. Telegram webhook POSTs). Processor task receives.
    pub inbound_tx: mpsc::Sender<InboundEvent>,
    pub channel_registry: Arc<ChannelRegistry>,
}

/// When auth mode is token and a token is configured, returns it for request validation.
fn require_request_token(config: &Config) -> Option<String> {
    if config.gateway.auth.mode == config::GatewayAuthMode::Token {
        config::resolve_gateway_token(config)
    } else {
        None
    }
}

/// Checks `Authorization: Bearer <token>` against the required token (if any).
fn authorized(headers: &HeaderMap, required: Option<&str>) -> bool {
    let Some(required) = required else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|t| t.trim() == required)
}

/// Process one inbound channel event: run the relay turn and deliver the reply on the event's channel.
/// When the answer provider fails, the conversation gets the generic error reply instead.
async fn process_inbound_event(state: GatewayState, event: InboundEvent) {
    let channel_id = event.conversation.channel_id.clone();
    let Some(handle) = state.channel_registry.get(&channel_id).await else {
        log::warn!("inbound: no channel registered for {}", channel_id);
        return;
    };
    match state.relay.run_turn(&event, handle.as_ref()).await {
        Ok(_) => {}
        Err(TurnError::Answer(e)) => {
            log::warn!("inbound: answer lookup failed: {}", e);
            if let Err(e) = handle
                .send_message(&event.conversation.conversation_id, GENERIC_ERROR_REPLY)
                .await
            {
                log::warn!("inbound: sending error reply failed: {}", e);
            }
        }
        Err(TurnError::Send(e)) => {
            log::warn!("inbound: send_message failed: {}", e);
        }
    }
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// When bind is not loopback, a gateway token must be configured or startup fails.
/// Blocks until shutdown (e.g. Ctrl+C).
/// Requires an initialized config file (`qnabot init`) and a complete QnA endpoint.
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    init::require_initialized(&config_path)?;
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        let token = config::resolve_gateway_token(&config);
        if token.is_none() || config.gateway.auth.mode != config::GatewayAuthMode::Token {
            anyhow::bail!(
                "refusing to bind gateway to {} without auth (set gateway.auth.mode to \"token\" and gateway.auth.token or QNABOT_GATEWAY_TOKEN)",
                bind
            );
        }
    }

    let client = QnaMakerClient::new(
        config::resolve_qna_endpoint(&config),
        config::resolve_qna_options(&config),
    )
    .context("configuring QnA Maker endpoint (qna.endpoint or QNA_* env)")?;
    let knowledge_base_id = client.knowledge_base_id().to_string();
    log::info!("relaying messages to knowledge base {}", knowledge_base_id);
    let relay = Relay::new(Arc::new(client)).with_fallback(config::resolve_fallback_answer(&config));

    let required_token = require_request_token(&config);
    let channel_tasks = Arc::new(tokio::sync::RwLock::new(Vec::new()));
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<InboundEvent>(INBOUND_QUEUE_CAPACITY);

    let state = GatewayState {
        config: Arc::new(config.clone()),
        required_token,
        relay: Arc::new(relay),
        knowledge_base_id,
        channel_tasks: channel_tasks.clone(),
        inbound_tx: inbound_tx.clone(),
        channel_registry: Arc::new(ChannelRegistry::new()),
    };

    {
        let state_inbound = state.clone();
        tokio::spawn(async move {
            while let Some(event) = inbound_rx.recv().await {
                tokio::spawn(process_inbound_event(state_inbound.clone(), event));
            }
        });
    }

    let telegram_token = config::resolve_telegram_token(&config);
    let webhook_url = config.channels.telegram.webhook_url.clone();
    let telegram_webhook_for_shutdown: Option<Arc<TelegramChannel>> =
        if let Some(token) = telegram_token {
            let telegram = Arc::new(
                match config::config_non_empty(config.channels.telegram.api_base.as_ref()) {
                    Some(api_base) => TelegramChannel::with_api_base(Some(token), &api_base),
                    None => TelegramChannel::new(Some(token)),
                },
            );
            if let Some(ref url) = webhook_url {
                let secret = config.channels.telegram.webhook_secret.as_deref();
                if let Err(e) = telegram.set_webhook(url, secret).await {
                    log::warn!("telegram set_webhook failed: {}", e);
                } else {
                    log::info!("telegram channel registered (webhook mode): {}", url);
                }
                state
                    .channel_registry
                    .register(telegram.id().to_string(), telegram.clone())
                    .await;
                Some(telegram)
            } else {
                state
                    .channel_registry
                    .register(telegram.id().to_string(), telegram.clone())
                    .await;
                let handle = telegram.start_inbound(inbound_tx);
                state.channel_tasks.write().await.push(handle);
                log::info!("telegram channel registered and getUpdates loop started");
                None
            }
        } else {
            None
        };

    let channel_registry = state.channel_registry.clone();
    let app = Router::new()
        .route("/", get(health_http))
        .route("/api/messages", post(messages_http))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            channel_registry,
            channel_tasks,
            telegram_webhook_for_shutdown,
        ))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops channel connectors, removes the Telegram webhook if used, then awaits in-process channel tasks.
async fn shutdown_signal(
    channel_registry: Arc<ChannelRegistry>,
    channel_tasks: Arc<tokio::sync::RwLock<Vec<JoinHandle<()>>>>,
    telegram_webhook: Option<Arc<TelegramChannel>>,
) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping channels");

    channel_registry.stop_all().await;

    if let Some(t) = telegram_webhook {
        if let Err(e) = t.delete_webhook().await {
            log::debug!("telegram delete_webhook on shutdown: {}", e);
        }
    }

    let handles = {
        let mut g = channel_tasks.write().await;
        std::mem::take(&mut *g)
    };
    for h in handles {
        let _ = h.await;
    }
    log::info!("channel tasks finished");
}

/// POST /api/messages — run one turn for the activity and return the reply in the body.
async fn messages_http(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers, state.required_token.as_deref()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized: bearer token missing or mismatched" })),
        )
            .into_response();
    }
    let activity: Activity = match serde_json::from_slice(&body) {
        Ok(a) => a,
        Err(e) => {
            log::debug!("api/messages: invalid activity: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid activity: {}", e) })),
            )
                .into_response();
        }
    };
    let event = activity.to_inbound_event();
    match state.relay.handle_turn(&event).await {
        Ok(Some(reply)) => Json(ActivitiesResponse {
            activities: vec![ReplyActivity::from_outbound(reply, &activity)],
        })
        .into_response(),
        Ok(None) => Json(ActivitiesResponse::default()).into_response(),
        Err(e) => {
            log::warn!("api/messages: answer lookup failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// POST /telegram/webhook — receives Telegram update JSON; verifies optional secret, queues the event.
async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.config.channels.telegram.webhook_secret {
        let provided = headers
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    let Some(event) = update.to_inbound_event() else {
        return StatusCode::OK;
    };
    if state.inbound_tx.send(event).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.config.gateway.port,
        "knowledgeBase": state.knowledge_base_id,
    }))
}
