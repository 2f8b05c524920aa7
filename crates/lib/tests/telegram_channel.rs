//! Integration tests: the gateway's Telegram channel against a Bot API stand-in, in
//! webhook and long-poll mode. Server tasks are left running when each test ends.

mod common;

use axum::http::StatusCode;
use common::{
    answer, config_for, spawn_mock_bot_api, spawn_mock_qna, temp_config_dir, wait_for_gateway,
    MockBotApi, MockQna,
};
use qnabot::config::Config;
use qnabot::gateway;
use serde_json::json;
use std::path::PathBuf;

const WEBHOOK_SECRET: &str = "hook-secret";

async fn start_gateway(config: Config, config_path: PathBuf) -> u16 {
    let port = config.gateway.port;
    tokio::spawn(async move {
        let _ = gateway::run_gateway(config, config_path).await;
    });
    wait_for_gateway(port).await;
    port
}

fn telegram_config(qna: &MockQna, bot_api: &MockBotApi, webhook: bool) -> Config {
    let mut config = config_for(qna);
    config.channels.telegram.bot_token = Some("123:test".to_string());
    config.channels.telegram.api_base = Some(bot_api.api_base.clone());
    if webhook {
        config.channels.telegram.webhook_url = Some("https://bot.example/telegram/webhook".to_string());
        config.channels.telegram.webhook_secret = Some(WEBHOOK_SECRET.to_string());
    }
    config
}

fn text_update(update_id: i64, chat_id: i64, text: &str) -> serde_json::Value {
    json!({
        "update_id": update_id,
        "message": { "message_id": 42, "chat": { "id": chat_id }, "text": text }
    })
}

async fn post_update(port: u16, secret: &str, update: serde_json::Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/telegram/webhook", port))
        .header("X-Telegram-Bot-Api-Secret-Token", secret)
        .json(&update)
        .send()
        .await
        .expect("POST /telegram/webhook")
}

#[tokio::test]
async fn webhook_message_is_answered_via_send_message() {
    let qna = spawn_mock_qna(StatusCode::OK, json!({ "answers": [answer("30 days", 90.0, 7)] })).await;
    let bot_api = spawn_mock_bot_api().await;
    let (_dir, config_path) = temp_config_dir();
    let port = start_gateway(telegram_config(&qna, &bot_api, true), config_path).await;

    let webhooks = bot_api.webhooks();
    assert_eq!(webhooks.len(), 1);
    assert_eq!(webhooks[0]["url"], "https://bot.example/telegram/webhook");
    assert_eq!(webhooks[0]["secret_token"], WEBHOOK_SECRET);

    let resp = post_update(
        port,
        WEBHOOK_SECRET,
        text_update(1, -100, "What is your return policy?"),
    )
    .await;
    assert_eq!(resp.status(), 200);

    let sent = bot_api.wait_for_sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], "-100");
    assert_eq!(sent[0]["text"], "30 days");
    assert_eq!(qna.requests()[0].body["question"], "What is your return policy?");
}

#[tokio::test]
async fn webhook_rejects_wrong_secret() {
    let qna = spawn_mock_qna(StatusCode::OK, json!({ "answers": [] })).await;
    let bot_api = spawn_mock_bot_api().await;
    let (_dir, config_path) = temp_config_dir();
    let port = start_gateway(telegram_config(&qna, &bot_api, true), config_path).await;

    let resp = post_update(port, "wrong", text_update(1, 5, "hello")).await;
    assert_eq!(resp.status(), 403);
    assert!(qna.requests().is_empty());
}

#[tokio::test]
async fn webhook_failure_sends_generic_error_reply() {
    let qna = spawn_mock_qna(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": { "code": "Unspecified" } }),
    )
    .await;
    let bot_api = spawn_mock_bot_api().await;
    let (_dir, config_path) = temp_config_dir();
    let port = start_gateway(telegram_config(&qna, &bot_api, true), config_path).await;

    let resp = post_update(port, WEBHOOK_SECRET, text_update(2, 5, "hello")).await;
    assert_eq!(resp.status(), 200);

    let sent = bot_api.wait_for_sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], "5");
    assert_eq!(sent[0]["text"], gateway::GENERIC_ERROR_REPLY);
}

#[tokio::test]
async fn long_poll_update_is_answered() {
    let qna = spawn_mock_qna(StatusCode::OK, json!({ "answers": [] })).await;
    let bot_api = spawn_mock_bot_api().await;
    bot_api.push_update(text_update(10, 77, "asdkjhasd"));
    let (_dir, config_path) = temp_config_dir();
    start_gateway(telegram_config(&qna, &bot_api, false), config_path).await;

    let sent = bot_api.wait_for_sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], "77");
    assert_eq!(sent[0]["text"], "No QnA Maker answers were found.");
    assert!(bot_api.webhooks().is_empty());
}
