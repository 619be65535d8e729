use std::time::Duration;

use rtc_session::backend::http::build_client;
use rtc_session::backend::TokenFetcher;
use rtc_session::error::RealtimeError;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher(server: &MockServer, app: &str) -> TokenFetcher {
    let client = build_client(Duration::from_secs(5)).unwrap();
    TokenFetcher::new(client, &format!("{}/", server.uri()), app)
}

#[tokio::test]
async fn get_returns_client_secret_value() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openai_rtc/api/session/"))
        .and(query_param("model", "gpt-4o-realtime-preview-2024-12-17"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "sess_1",
            "client_secret": {"value": "ek_abc123", "expires_at": 1735689600}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = fetcher(&server, "openai_rtc")
        .fetch("gpt-4o-realtime-preview-2024-12-17")
        .await
        .unwrap();
    assert_eq!(token.expose(), "ek_abc123");
    assert_eq!(format!("{token:?}"), "SessionToken(ek_a..)");
}

#[tokio::test]
async fn unauthorized_response_is_token_error_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openai_rtc/api/session/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid API key"})))
        .expect(1)
        .mount(&server)
        .await;

    let error = fetcher(&server, "openai_rtc").fetch("m").await.unwrap_err();
    match error {
        RealtimeError::TokenAcquisition { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("Invalid API key"), "{body}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn success_without_client_secret_is_token_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/translator/api/session/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"client_secret": {}})))
        .mount(&server)
        .await;

    let error = fetcher(&server, "translator").fetch("m").await.unwrap_err();
    assert!(matches!(error, RealtimeError::TokenAcquisition { status: 200, .. }));
}

#[tokio::test]
async fn post_sends_model_instructions_and_csrf_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/subtitle/api/session/"))
        .and(header("x-csrftoken", "csrf-abc"))
        .and(header("x-requested-with", "XMLHttpRequest"))
        .and(body_json(json!({
            "model": "gpt-4o-realtime-preview",
            "instructions": "Please respond in Japanese."
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"client_secret": {"value": "ek_sub"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let token = fetcher(&server, "subtitle")
        .with_csrf_token("csrf-abc")
        .fetch_with_instructions("gpt-4o-realtime-preview", "Please respond in Japanese.")
        .await
        .unwrap();
    assert_eq!(token.expose(), "ek_sub");
}

#[tokio::test]
async fn endpoint_joins_backend_and_app() {
    let server = MockServer::start().await;
    let fetcher = fetcher(&server, "translator");
    assert_eq!(
        fetcher.endpoint(),
        format!("{}/translator/api/session/", server.uri())
    );
}
