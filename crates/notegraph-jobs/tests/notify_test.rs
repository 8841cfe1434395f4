//! Webhook notification channel against a mock HTTP receiver.

use std::time::Duration;

use notegraph_jobs::{Error, Notification, NotificationChannel, WebhookChannel};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn question() -> Notification {
    Notification {
        recipient: "0190c1a2-0000-7000-8000-000000000001".to_string(),
        text: "Which Raj do you mean?".to_string(),
        correlation: json!({"clarification_id": "c-1", "note_id": "n-1"}),
    }
}

#[tokio::test]
async fn test_webhook_posts_notification_and_returns_message_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/clarify"))
        .and(body_json(json!({
            "recipient": "0190c1a2-0000-7000-8000-000000000001",
            "text": "Which Raj do you mean?",
            "correlation": {"clarification_id": "c-1", "note_id": "n-1"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message_id": "msg-42"})))
        .expect(1)
        .mount(&server)
        .await;

    let channel = WebhookChannel::new(
        format!("{}/hooks/clarify", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap();
    assert_eq!(channel.send(&question()).await.unwrap(), "msg-42");
}

#[tokio::test]
async fn test_webhook_error_status_is_notification_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let channel = WebhookChannel::new(server.uri(), Duration::from_secs(5)).unwrap();
    let err = channel.send(&question()).await.unwrap_err();
    assert!(matches!(err, Error::Notification(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_webhook_reply_without_message_id_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let channel = WebhookChannel::new(server.uri(), Duration::from_secs(5)).unwrap();
    let err = channel.send(&question()).await.unwrap_err();
    assert!(err.to_string().contains("message_id"));
}

#[tokio::test]
async fn test_webhook_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message_id": "late"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let channel = WebhookChannel::new(server.uri(), Duration::from_secs(1)).unwrap();
    let err = channel.send(&question()).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "got {:?}", err);
}
