//! Shared helpers: free ports, temp config dirs, and in-process stand-ins for the
//! QnA Maker generateAnswer endpoint and the Telegram Bot API.

#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use qnabot::config::Config;
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const KB_ID: &str = "kb-test";
pub const ENDPOINT_KEY: &str = "endpoint-key";

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

pub fn temp_config_dir() -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(format!("qnabot-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create config dir");
    let config_path = dir.join("config.json");
    std::fs::File::create(&config_path)
        .and_then(|mut f| f.write_all(b"{}"))
        .expect("write config.json");
    (dir, config_path)
}

/// One generateAnswer call as seen by the mock service.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub kb_id: String,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    status: StatusCode,
    response: Value,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Running mock QnA Maker service. `host` is what goes into `qna.endpoint.host`.
pub struct MockQna {
    pub host: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockQna {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn generate_answer(
    State(state): State<MockState>,
    Path(kb_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.requests.lock().unwrap().push(RecordedRequest {
        kb_id,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });
    (state.status, Json(state.response.clone()))
}

/// Start a mock service that answers every generateAnswer call with `status` and `response`.
pub async fn spawn_mock_qna(status: StatusCode, response: Value) -> MockQna {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        status,
        response,
        requests: requests.clone(),
    };
    let app = Router::new()
        .route(
            "/qnamaker/knowledgebases/:kb_id/generateAnswer",
            post(generate_answer),
        )
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock qna");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    MockQna {
        host: format!("http://127.0.0.1:{}/qnamaker", port),
        requests,
    }
}

/// Service answer JSON on the 0–100 scale.
pub fn answer(text: &str, score: f64, id: i64) -> Value {
    serde_json::json!({
        "questions": [format!("question for {}", text)],
        "answer": text,
        "score": score,
        "id": id,
        "source": "faq.tsv",
        "metadata": []
    })
}

/// Config pointing at `mock` on a free gateway port.
pub fn config_for(mock: &MockQna) -> Config {
    let mut config = Config::default();
    config.gateway.port = free_port();
    config.gateway.bind = "127.0.0.1".to_string();
    config.qna.endpoint.host = Some(mock.host.clone());
    config.qna.endpoint.knowledge_base_id = Some(KB_ID.to_string());
    config.qna.endpoint.endpoint_key = Some(ENDPOINT_KEY.to_string());
    config
}

/// Poll GET / until the gateway answers; panics after 5s.
pub async fn wait_for_gateway(port: u16) {
    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => return,
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "GET {} did not return 200 within 5s; last error: {:?}",
        url, last_err
    );
}

#[derive(Clone, Default)]
struct BotApiState {
    pending_updates: Arc<Mutex<Vec<Value>>>,
    sent: Arc<Mutex<Vec<Value>>>,
    webhooks: Arc<Mutex<Vec<Value>>>,
}

/// Running stand-in for the Telegram Bot API. `api_base` goes into `channels.telegram.apiBase`.
pub struct MockBotApi {
    pub api_base: String,
    state: BotApiState,
}

impl MockBotApi {
    /// Queue an update for the next getUpdates call.
    pub fn push_update(&self, update: Value) {
        self.state.pending_updates.lock().unwrap().push(update);
    }

    /// sendMessage bodies received so far.
    pub fn sent(&self) -> Vec<Value> {
        self.state.sent.lock().unwrap().clone()
    }

    /// setWebhook bodies received so far.
    pub fn webhooks(&self) -> Vec<Value> {
        self.state.webhooks.lock().unwrap().clone()
    }

    /// Poll until at least one sendMessage arrived; panics after 5s.
    pub async fn wait_for_sent(&self) -> Vec<Value> {
        for _ in 0..100 {
            let sent = self.sent();
            if !sent.is_empty() {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("no sendMessage call within 5s");
    }
}

async fn bot_get_updates(State(state): State<BotApiState>) -> Json<Value> {
    let updates: Vec<Value> = std::mem::take(&mut *state.pending_updates.lock().unwrap());
    if updates.is_empty() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Json(serde_json::json!({ "ok": true, "result": updates }))
}

async fn bot_send_message(
    State(state): State<BotApiState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.sent.lock().unwrap().push(body);
    Json(serde_json::json!({ "ok": true, "result": {} }))
}

async fn bot_set_webhook(State(state): State<BotApiState>, Json(body): Json<Value>) -> Json<Value> {
    state.webhooks.lock().unwrap().push(body);
    Json(serde_json::json!({ "ok": true, "result": true }))
}

async fn bot_delete_webhook() -> Json<Value> {
    Json(serde_json::json!({ "ok": true, "result": true }))
}

/// Start a Bot API stand-in serving getUpdates, sendMessage, setWebhook and deleteWebhook
/// for any bot token.
pub async fn spawn_mock_bot_api() -> MockBotApi {
    let state = BotApiState::default();
    let app = Router::new()
        .route("/:bot/getUpdates", get(bot_get_updates))
        .route("/:bot/sendMessage", post(bot_send_message))
        .route("/:bot/setWebhook", post(bot_set_webhook))
        .route("/:bot/deleteWebhook", post(bot_delete_webhook))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock bot api");
    let port = listener.local_addr().expect("local_addr").port();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    MockBotApi {
        api_base: format!("http://127.0.0.1:{}", port),
        state,
    }
}
