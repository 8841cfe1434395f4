//! HTTP-level tests for the OpenAI-compatible backend and the extractor.

use std::sync::Arc;

use notegraph_inference::openai::{OpenAIBackend, OpenAIConfig};
use notegraph_inference::{
    EmbeddingBackend, Error, ExtractionBackend, ExtractionNote, ExtractionRequest,
    GenerationBackend, KnownNames, LlmExtractor,
};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer, dimension: usize) -> OpenAIBackend {
    OpenAIBackend::new(OpenAIConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        embed_model: "test-embed".to_string(),
        gen_model: "test-gen".to_string(),
        embed_dimension: dimension,
        timeout_seconds: 5,
        temperature: Some(0.0),
    })
    .expect("Failed to create backend")
}

fn chat_reply(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn test_embeddings_are_ordered_by_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "test-embed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"embedding": [0.0, 1.0], "index": 1},
                {"embedding": [1.0, 0.0], "index": 0}
            ],
            "model": "test-embed"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let vectors = backend(&server, 2)
        .embed_texts(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();

    assert_eq!(vectors[0].to_vec(), vec![1.0, 0.0]);
    assert_eq!(vectors[1].to_vec(), vec![0.0, 1.0]);
}

#[tokio::test]
async fn test_embedding_dimension_mismatch_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [1.0, 0.0, 0.0], "index": 0}]
        })))
        .mount(&server)
        .await;

    let err = backend(&server, 2)
        .embed_texts(&["x".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
    assert!(err.to_string().contains("dimension mismatch"));
}

#[tokio::test]
async fn test_empty_embedding_input_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    assert!(backend(&server, 2).embed_texts(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rate_limit_maps_to_embedding_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "slow down", "type": "rate_limit_exceeded"}
        })))
        .mount(&server)
        .await;

    let err = backend(&server, 2)
        .embed_texts(&["x".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(_)));
    assert!(err.to_string().contains("Rate limit exceeded"));
}

#[tokio::test]
async fn test_auth_failure_maps_to_config_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
        .mount(&server)
        .await;

    let err = backend(&server, 2).generate("hi").await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_slow_server_surfaces_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_reply("late"))
                .set_delay(std::time::Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let slow = OpenAIBackend::new(OpenAIConfig {
        base_url: server.uri(),
        timeout_seconds: 1,
        ..Default::default()
    })
    .unwrap();
    let err = slow.generate("hi").await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_json_mode_requested_for_extraction() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();
    let note_id = Uuid::new_v4();

    let reply = json!({
        "results": {
            note_id.to_string(): {
                "summary": {"text": "Kickoff with Acme", "keyPoints": []},
                "entities": {"people": ["Sarah Johnson"]}
            }
        }
    });
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "test-gen",
            "response_format": {"type": "json_object"}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(chat_reply(&format!("```json\n{}\n```", reply))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let extractor = LlmExtractor::new(Arc::new(backend(&server, 2)));
    let response = extractor
        .extract(&ExtractionRequest {
            user_id,
            notes: vec![ExtractionNote {
                id: note_id,
                title: "Kickoff".to_string(),
                content: "Met Sarah from Acme".to_string(),
                user_id,
                clarifications: vec![],
            }],
            knowledge: KnownNames::default(),
        })
        .await
        .unwrap();

    let extraction = response.for_note(note_id).unwrap();
    assert_eq!(extraction.summary.text(), "Kickoff with Acme");
    assert_eq!(extraction.entities.people[0].name, "Sarah Johnson");
    assert_eq!(extractor.model_name(), "test-gen");
}

#[tokio::test]
async fn test_plain_generation_has_no_response_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("hello")))
        .mount(&server)
        .await;

    let b = backend(&server, 2);
    assert_eq!(b.generate_with_system("be brief", "hi").await.unwrap(), "hello");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("response_format").is_none());
    assert_eq!(body["messages"][0]["role"], "system");
}
