//! HTTP provider tests against a local mock server, covering the wire format
//! and the mapping from HTTP statuses to pipeline errors.

use scribe::credential::{Credential, CredentialTier};
use scribe::error::PipelineError;
use scribe::provider::{GenerationProvider, HttpProvider, ProviderConfig, ProviderRequest};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer) -> HttpProvider {
    let config = ProviderConfig {
        endpoint: server.uri(),
        model: "test-model".to_string(),
        ..ProviderConfig::default()
    };
    HttpProvider::new(config).unwrap()
}

fn credential(value: &str) -> Credential {
    Credential {
        source: CredentialTier::SharedPool,
        value: value.to_string(),
    }
}

fn request() -> ProviderRequest {
    ProviderRequest {
        system_prompt: "Respond with JSON.".to_string(),
        user_prompt: "Input:\n{}".to_string(),
    }
}

#[tokio::test]
async fn successful_completion_returns_message_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer key-test"))
        .and(body_partial_json(json!({"model": "test-model", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "{\"ok\": 1}"}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let raw = provider_for(&server)
        .send(&credential("key-test"), &request())
        .await
        .unwrap();
    assert_eq!(raw, "{\"ok\": 1}");
}

#[tokio::test]
async fn unauthorized_maps_to_credential_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .send(&credential("key-bad"), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::CredentialRejected(_)));
    assert!(err.is_credential_rejection());
}

#[tokio::test]
async fn rate_limit_carries_retry_after_header_hint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "7")
                .set_body_string("rate limit exceeded"),
        )
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .send(&credential("key-test"), &request())
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn rate_limit_body_hint_is_used_when_header_is_absent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "slow down", "retry_after": 3.0}
        })))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .send(&credential("key-test"), &request())
        .await
        .unwrap_err();
    assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
}

#[tokio::test]
async fn server_error_maps_to_transient_request_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream overloaded"))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .send(&credential("key-test"), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::RequestFailed(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn empty_choices_is_a_request_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .send(&credential("key-test"), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::RequestFailed(_)));
}
