use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stocklens::bootstrap::http_client;
use stocklens::credentials::ApiKey;
use stocklens::providers::cloudflare::CloudflareProvider;
use stocklens::providers::gemini::GeminiProvider;
use stocklens::providers::openai_compatible::OpenAiCompatibleProvider;
use stocklens::providers::{FailureKind, Image, Provider, TaskRequest};

fn client() -> reqwest::Client {
    http_client(Duration::from_secs(5)).unwrap()
}

fn chat_completion(content: &str) -> serde_json::Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

fn openai(server: &MockServer, models: &[&str]) -> OpenAiCompatibleProvider {
    OpenAiCompatibleProvider::new(
        "openrouter",
        server.uri(),
        ApiKey::new("sk-test"),
        models.iter().map(|m| (*m).to_owned()).collect(),
        client(),
    )
}

#[tokio::test]
async fn openai_compatible_sends_auth_headers_and_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("X-Title", "Check My Stocks"))
        .and(body_partial_json(json!({ "model": "vision-model" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("hello")))
        .expect(1)
        .mount(&server)
        .await;

    let provider = openai(&server, &["vision-model"])
        .with_headers(vec![("X-Title".to_owned(), "Check My Stocks".to_owned())]);
    let request = TaskRequest::new("read this").with_image(Image::png(b"png".to_vec()));

    assert_eq!(provider.invoke(&request).await.unwrap(), "hello");
    assert_eq!(provider.current_model(), Some("vision-model"));
}

#[tokio::test]
async fn quota_status_classifies_as_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = openai(&server, &["m"])
        .invoke(&TaskRequest::new("hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::RateLimited);
    assert!(err.message.contains("429"));
}

#[tokio::test]
async fn decommissioned_model_code_beats_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "model_decommissioned", "message": "gone" }
        })))
        .mount(&server)
        .await;

    let err = openai(&server, &["old-model"])
        .invoke(&TaskRequest::new("hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::NotFoundOrRemoved);
    assert!(err.kind.is_stale_config());
}

#[tokio::test]
async fn server_error_does_not_bench() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = openai(&server, &["m"])
        .invoke(&TaskRequest::new("hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Other);
    assert!(!err.kind.benches());
}

#[tokio::test]
async fn model_sub_list_falls_back_and_sticks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "model": "primary" })))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "model": "backup" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("from backup")))
        .mount(&server)
        .await;

    let provider = openai(&server, &["primary", "backup"]);
    assert_eq!(provider.invoke(&TaskRequest::new("hi")).await.unwrap(), "from backup");
    assert_eq!(provider.current_model(), Some("backup"));

    provider.invoke(&TaskRequest::new("again")).await.unwrap();
    let primary_calls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| String::from_utf8_lossy(&r.body).contains("\"primary\""))
        .count();
    assert_eq!(primary_calls, 1, "remembered model is tried first");
}

#[tokio::test]
async fn whole_sub_list_failing_reports_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = openai(&server, &["a", "b"])
        .invoke(&TaskRequest::new("hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Exhausted);
    assert!(err.kind.benches());
}

#[tokio::test]
async fn empty_completion_is_an_ordinary_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("  ")))
        .mount(&server)
        .await;

    let err = openai(&server, &["m"])
        .invoke(&TaskRequest::new("hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Other);
}

#[tokio::test]
async fn gemini_rotates_to_next_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .and(header("x-goog-api-key", "key-1"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "code": 429, "status": "RESOURCE_EXHAUSTED", "message": "quota" }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .and(header("x-goog-api-key", "key-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "from " }, { "text": "key two" }] } }]
        })))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new(
        "gemini",
        server.uri(),
        vec![ApiKey::new("key-1"), ApiKey::new("key-2")],
        vec!["gemini-2.5-flash".to_owned()],
        client(),
    );
    let request = TaskRequest::new("read").with_image(Image::png(b"png".to_vec()));
    assert_eq!(provider.invoke(&request).await.unwrap(), "from key two");

    provider.invoke(&request).await.unwrap();
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3, "second call starts with the remembered key");
}

#[tokio::test]
async fn gemini_single_key_surfaces_raw_quota_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "status": "RESOURCE_EXHAUSTED", "message": "quota" }
        })))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new(
        "gemini",
        server.uri(),
        vec![ApiKey::new("only")],
        vec!["gemini-2.5-flash".to_owned()],
        client(),
    );
    let err = provider.invoke(&TaskRequest::new("hi")).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::RateLimited);
}

#[tokio::test]
async fn cloudflare_reads_result_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/accounts/acct/ai/run/@cf/meta/llama"))
        .and(header("authorization", "Bearer cf-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "result": { "response": "workers answer" },
            "errors": []
        })))
        .mount(&server)
        .await;

    let provider = CloudflareProvider::new(
        "cloudflare",
        server.uri(),
        "acct",
        ApiKey::new("cf-token"),
        vec!["@cf/meta/llama".to_owned()],
        client(),
    );
    assert_eq!(
        provider.invoke(&TaskRequest::new("hi")).await.unwrap(),
        "workers answer"
    );
}

#[tokio::test]
async fn cloudflare_unsuccessful_envelope_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "result": null,
            "errors": [{ "code": 5007, "message": "model not available" }]
        })))
        .mount(&server)
        .await;

    let provider = CloudflareProvider::new(
        "cloudflare",
        server.uri(),
        "acct",
        ApiKey::new("cf-token"),
        vec!["@cf/meta/llama".to_owned()],
        client(),
    );
    let err = provider.invoke(&TaskRequest::new("hi")).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Other);
    assert!(err.message.contains("model not available"));
}

#[tokio::test]
async fn removed_model_is_skipped_for_the_rest_of_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "model": "deepseek-r1-distill-llama-70b" })))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "model_not_found", "message": "does not exist" }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "model": "llama-3.3-70b-versatile" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("ok")))
        .expect(2)
        .mount(&server)
        .await;

    let provider = openai(&server, &["deepseek-r1-distill-llama-70b", "llama-3.3-70b-versatile"]);
    assert_eq!(provider.invoke(&TaskRequest::new("first")).await.unwrap(), "ok");
    assert_eq!(provider.current_model(), Some("llama-3.3-70b-versatile"));
    assert_eq!(provider.invoke(&TaskRequest::new("second")).await.unwrap(), "ok");
}

#[tokio::test]
async fn every_model_removed_reports_stale_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let provider = openai(&server, &["old-a", "old-b"]);
    let err = provider.invoke(&TaskRequest::new("hi")).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Exhausted);

    // Both entries are retired, so nothing further reaches the server.
    let err = provider.invoke(&TaskRequest::new("again")).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::NotFoundOrRemoved);
    assert!(err.kind.is_stale_config());
}
