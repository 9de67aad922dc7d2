//! Tests for the webhook side of [`botgram_dispatch::Updater`]: prompt 200 replies,
//! secret-token enforcement, and rejection of undecodable payloads.

mod common;

use botgram_dispatch::{Updater, WebhookOptions};
use common::FakeBot;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

fn webhook_options() -> WebhookOptions {
    WebhookOptions {
        addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        path: "/webhook".to_string(),
        secret_token: Some("s3cret".to_string()),
        webhook_url: None,
    }
}

const UPDATE_JSON: &str = r#"{
    "update_id": 500,
    "message": {
        "message_id": 1,
        "date": 1700000000,
        "chat": {"id": 7, "type": "private"},
        "text": "via webhook"
    }
}"#;

/// **Test: a valid POST is answered 200 and the update lands on the queue.**
#[tokio::test]
async fn test_webhook_accepts_update() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let updater = Updater::new(Arc::new(FakeBot::idle()), tx);
    updater.initialize().await;
    let addr = updater.start_webhook(webhook_options()).await.unwrap();

    let response = reqwest::Client::new()
        .post(format!("http://{}/webhook", addr))
        .header("X-Telegram-Bot-Api-Secret-Token", "s3cret")
        .header("content-type", "application/json")
        .body(UPDATE_JSON)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let update = rx.recv().await.unwrap();
    assert_eq!(update.update_id, 500);

    updater.stop().await.unwrap();
}

/// **Test: a wrong or missing secret token is rejected with 403 and nothing is queued.**
#[tokio::test]
async fn test_webhook_rejects_wrong_secret() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let updater = Updater::new(Arc::new(FakeBot::idle()), tx);
    updater.initialize().await;
    let addr = updater.start_webhook(webhook_options()).await.unwrap();

    let client = reqwest::Client::new();
    let wrong = client
        .post(format!("http://{}/webhook", addr))
        .header("X-Telegram-Bot-Api-Secret-Token", "wrong")
        .header("content-type", "application/json")
        .body(UPDATE_JSON)
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 403);

    let missing = client
        .post(format!("http://{}/webhook", addr))
        .header("content-type", "application/json")
        .body(UPDATE_JSON)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 403);

    assert!(rx.try_recv().is_err());
    updater.stop().await.unwrap();
}

/// **Test: undecodable payloads are answered 400 and dropped.**
#[tokio::test]
async fn test_webhook_rejects_bad_json() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let updater = Updater::new(Arc::new(FakeBot::idle()), tx);
    updater.initialize().await;
    let addr = updater.start_webhook(webhook_options()).await.unwrap();

    let response = reqwest::Client::new()
        .post(format!("http://{}/webhook", addr))
        .header("X-Telegram-Bot-Api-Secret-Token", "s3cret")
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    assert!(rx.try_recv().is_err());
    updater.stop().await.unwrap();
}

/// **Test: after stop() the listener no longer accepts connections.**
#[tokio::test]
async fn test_webhook_stops_listening() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let updater = Updater::new(Arc::new(FakeBot::idle()), tx);
    updater.initialize().await;
    let addr = updater.start_webhook(webhook_options()).await.unwrap();
    updater.stop().await.unwrap();

    let result = reqwest::Client::new()
        .post(format!("http://{}/webhook", addr))
        .header("X-Telegram-Bot-Api-Secret-Token", "s3cret")
        .header("content-type", "application/json")
        .body(UPDATE_JSON)
        .send()
        .await;
    assert!(result.is_err());
}
