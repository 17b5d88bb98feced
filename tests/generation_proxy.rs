use std::time::Duration;

use futures::StreamExt;
use model_registry_server::config::Config;
use model_registry_server::interaction_log::ELLIPSIS;
use model_registry_server::proxy::{GenerateRequest, StreamItem};
use model_registry_server::registry::{GenerationParams, NewEntry, RegistryEntry};
use model_registry_server::AppState;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn register(state: &AppState, kind: &str, url: &str, defaults: Option<GenerationParams>) -> RegistryEntry {
    state
        .registry
        .create(NewEntry {
            display_name: "Backend".to_string(),
            kind: kind.to_string(),
            endpoint_url: url.to_string(),
            auth_token: None,
            generation_defaults: defaults,
        })
        .await
        .unwrap()
}

fn request(registry_id: &str, prompt: &str) -> GenerateRequest {
    GenerateRequest {
        registry_id: registry_id.to_string(),
        model_name: "llama3".to_string(),
        prompt: prompt.to_string(),
        gen_params: GenerationParams::default(),
    }
}

#[tokio::test]
async fn unknown_registry_id_is_not_found_without_log() {
    let state = AppState::new(&Config::default()).unwrap();
    let outcome = state.proxy.generate(&request("missing", "hi")).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.unwrap().kind, "NotFound");
    assert!(outcome.log_entry.is_none());
    assert!(outcome.result.is_none());
}

#[tokio::test]
async fn ollama_response_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "llama3",
            "prompt": "say hello",
            "stream": false,
            "options": {"num_predict": 1000, "temperature": 0.7, "top_p": 0.9}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "hello", "eval_count": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let state = AppState::new(&Config::default()).unwrap();
    let entry = register(&state, "ollama-like", &server.uri(), None).await;

    let outcome = state.proxy.generate(&request(&entry.id, "say hello")).await;
    assert!(outcome.success, "{:?}", outcome.error);

    let result = outcome.result.unwrap();
    assert_eq!(result.text, "hello");
    assert_eq!(result.token_count, Some(3));

    let log_entry = outcome.log_entry.unwrap();
    assert!(log_entry.succeeded);
    assert!(log_entry.error_message.is_none());
    assert_eq!(log_entry.registry_id, entry.id);
    assert_eq!(log_entry.requested_model, "llama3");
    assert_eq!(log_entry.response_excerpt, "hello");
    assert_eq!(log_entry.token_count, Some(3));
}

#[tokio::test]
async fn request_params_override_entry_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .and(body_partial_json(json!({"n_predict": 5, "temperature": 0.1, "top_p": 0.9})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": "ok",
            "tokens_predicted": 5,
            "timings": {"predicted_ms": 40.0}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = AppState::new(&Config::default()).unwrap();
    let defaults = GenerationParams {
        max_tokens: Some(200),
        temperature: Some(0.1),
        ..Default::default()
    };
    let entry = register(&state, "llamacpp-like", &server.uri(), Some(defaults)).await;

    let mut req = request(&entry.id, "p");
    req.gen_params.max_tokens = Some(5);

    let outcome = state.proxy.generate(&req).await;
    let result = outcome.result.unwrap();
    assert_eq!(result.text, "ok");
    assert_eq!(result.backend_duration_ms, Some(40));
}

#[tokio::test]
async fn upstream_error_becomes_failed_outcome() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let state = AppState::new(&Config::default()).unwrap();
    let entry = register(&state, "openai-like", &server.uri(), None).await;

    let prompt = "x".repeat(250);
    let outcome = state.proxy.generate(&request(&entry.id, &prompt)).await;
    assert!(!outcome.success);

    let error = outcome.error.unwrap();
    assert_eq!(error.kind, "UpstreamError");
    assert!(error.message.contains("503"), "{}", error.message);

    let log_entry = outcome.log_entry.unwrap();
    assert!(!log_entry.succeeded);
    assert_eq!(log_entry.error_message.as_deref(), Some(error.message.as_str()));
    assert_eq!(log_entry.prompt_excerpt, format!("{}{}", "x".repeat(100), ELLIPSIS));
}

#[tokio::test]
async fn backend_timeout_is_reported_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)))
        .mount(&server)
        .await;

    let state = AppState::new(&Config::default()).unwrap();
    let defaults = GenerationParams {
        timeout_ms: Some(100),
        ..Default::default()
    };
    let entry = register(&state, "generic-http", &server.uri(), Some(defaults)).await;

    let outcome = state.proxy.generate(&request(&entry.id, "hi")).await;
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().message.contains("timed out"));
    assert!(outcome.log_entry.unwrap().latency_ms >= 100);
}

#[tokio::test]
async fn malformed_success_body_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let state = AppState::new(&Config::default()).unwrap();
    let entry = register(&state, "generic-http", &server.uri(), None).await;

    let outcome = state.proxy.generate(&request(&entry.id, "hi")).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.unwrap().kind, "UpstreamError");
}

#[tokio::test]
async fn ollama_stream_yields_tokens_then_log_entry() {
    let server = MockServer::start().await;
    let ndjson = concat!(
        "{\"response\":\"Hel\",\"done\":false}\n",
        "{\"response\":\"lo\",\"done\":false}\n",
        "{\"response\":\"\",\"done\":true,\"eval_count\":2}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson))
        .mount(&server)
        .await;

    let state = AppState::new(&Config::default()).unwrap();
    let entry = register(&state, "ollama-like", &server.uri(), None).await;

    let items: Vec<StreamItem> = state
        .proxy
        .clone()
        .into_stream(entry.clone(), request(&entry.id, "greet"))
        .collect()
        .await;

    let tokens: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            StreamItem::Token(t) => Some(t.token.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(tokens, vec!["Hel".to_string(), "lo".to_string(), String::new()]);

    match items.last() {
        Some(StreamItem::Finished(log_entry)) => {
            assert!(log_entry.succeeded);
            assert_eq!(log_entry.response_excerpt, "Hello");
            assert_eq!(log_entry.token_count, Some(2));
        }
        other => panic!("expected final log entry, got {:?}", other),
    }
}

#[tokio::test]
async fn unterminated_final_stream_line_is_kept() {
    let server = MockServer::start().await;
    let ndjson = concat!(
        "{\"response\":\"He\",\"done\":false}\n",
        "{\"response\":\"llo\",\"done\":true,\"eval_count\":2}",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson))
        .mount(&server)
        .await;

    let state = AppState::new(&Config::default()).unwrap();
    let entry = register(&state, "ollama-like", &server.uri(), None).await;

    let items: Vec<StreamItem> = state
        .proxy
        .clone()
        .into_stream(entry.clone(), request(&entry.id, "greet"))
        .collect()
        .await;

    let tokens: Vec<(String, bool)> = items
        .iter()
        .filter_map(|item| match item {
            StreamItem::Token(t) => Some((t.token.clone(), t.complete)),
            _ => None,
        })
        .collect();
    assert_eq!(tokens, vec![("He".to_string(), false), ("llo".to_string(), true)]);

    match items.last() {
        Some(StreamItem::Finished(log_entry)) => {
            assert!(log_entry.succeeded);
            assert_eq!(log_entry.response_excerpt, "Hello");
            assert_eq!(log_entry.token_count, Some(2));
        }
        other => panic!("expected final log entry, got {:?}", other),
    }
}

#[tokio::test]
async fn generic_backend_cannot_stream() {
    let state = AppState::new(&Config::default()).unwrap();
    let entry = register(&state, "generic-http", "http://127.0.0.1:1", None).await;

    let items: Vec<StreamItem> = state
        .proxy
        .clone()
        .into_stream(entry.clone(), request(&entry.id, "hi"))
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert!(matches!(&items[0], StreamItem::Failed(detail) if detail.kind == "UpstreamError"));
    assert!(matches!(&items[1], StreamItem::Finished(log) if !log.succeeded));
}
