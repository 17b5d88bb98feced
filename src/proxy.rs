//! Forwards generation requests to registered backends and normalizes the
//! outcome. Nothing in here returns an error to the caller: upstream failures
//! become a `success: false` outcome with a failed log entry attached.

use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::backend::Completion;
use crate::interaction_log::InteractionLogEntry;
use crate::registry::{GenerationParams, RegistryEntry, RegistryStore};

pub const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub registry_id: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub gen_params: GenerationParams,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub text: String,
    pub token_count: Option<u64>,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyError {
    #[error("registry entry '{0}' not found")]
    NotFound(String),
    #[error("{0}")]
    Upstream(String),
}

impl ProxyError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::NotFound(_) => "NotFound",
            ProxyError::Upstream(_) => "UpstreamError",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

impl From<&ProxyError> for ErrorDetail {
    fn from(err: &ProxyError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    pub log_entry: Option<InteractionLogEntry>,
}

impl GenerateOutcome {
    fn succeeded(result: GenerationResult, log_entry: InteractionLogEntry) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            log_entry: Some(log_entry),
        }
    }

    fn failed(error: &ProxyError, log_entry: Option<InteractionLogEntry>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            log_entry,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamToken {
    pub token: String,
    pub token_id: u32,
    pub complete: bool,
}

#[derive(Debug, Clone)]
pub enum StreamItem {
    Token(StreamToken),
    Failed(ErrorDetail),
    Finished(InteractionLogEntry),
}

#[derive(Clone)]
pub struct GenerationProxy {
    store: RegistryStore,
    client: Client,
    default_timeout: Duration,
}

impl GenerationProxy {
    pub fn new(store: RegistryStore, client: Client, default_timeout: Duration) -> Self {
        Self {
            store,
            client,
            default_timeout,
        }
    }

    pub async fn lookup(&self, registry_id: &str) -> Result<RegistryEntry, ProxyError> {
        self.store
            .get(registry_id)
            .await
            .ok_or_else(|| ProxyError::NotFound(registry_id.to_string()))
    }

    fn timeout_for(&self, entry: &RegistryEntry, request: &GenerateRequest) -> Duration {
        request
            .gen_params
            .timeout_ms_over(&entry.generation_defaults)
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
    }

    pub async fn generate(&self, request: &GenerateRequest) -> GenerateOutcome {
        let entry = match self.lookup(&request.registry_id).await {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(registry_id = %request.registry_id, "generation against unknown registry entry");
                return GenerateOutcome::failed(&err, None);
            }
        };

        let started = Instant::now();
        let budget = self.timeout_for(&entry, request);
        let result = match timeout(budget, self.call_backend(&entry, request)).await {
            Ok(result) => result,
            Err(_) => Err(format!("{} request timed out after {} ms", entry.kind, budget.as_millis())),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(completion) => {
                tracing::info!(
                    registry_id = %entry.id,
                    model = %request.model_name,
                    latency_ms,
                    tokens = ?completion.token_count,
                    "generation succeeded"
                );
                let log_entry = InteractionLogEntry::success(
                    &entry.id,
                    &request.model_name,
                    &request.prompt,
                    &completion.text,
                    latency_ms,
                    completion.token_count,
                );
                GenerateOutcome::succeeded(
                    GenerationResult {
                        text: completion.text,
                        token_count: completion.token_count,
                        latency_ms,
                        backend_duration_ms: completion.backend_duration_ms,
                    },
                    log_entry,
                )
            }
            Err(message) => {
                tracing::warn!(
                    registry_id = %entry.id,
                    model = %request.model_name,
                    latency_ms,
                    error = %message,
                    "generation failed"
                );
                let log_entry = InteractionLogEntry::failure(
                    &entry.id,
                    &request.model_name,
                    &request.prompt,
                    &message,
                    latency_ms,
                );
                GenerateOutcome::failed(&ProxyError::Upstream(message), Some(log_entry))
            }
        }
    }

    async fn call_backend(&self, entry: &RegistryEntry, request: &GenerateRequest) -> Result<Completion, String> {
        let params = request.gen_params.resolve(&entry.generation_defaults);
        let body = entry
            .kind
            .build_request(&request.model_name, &request.prompt, &params, false);

        let mut call = self.client.post(entry.kind.generate_url(&entry.endpoint_url)).json(&body);
        if let Some(token) = entry.auth_token.as_deref() {
            call = call.bearer_auth(token);
        }

        let response = call
            .send()
            .await
            .map_err(|e| format!("{} request failed: {}", entry.kind, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(if error_text.is_empty() {
                format!("{} API error: {}", entry.kind, status)
            } else {
                format!("{} API error: {} - {}", entry.kind, status, error_text.trim())
            });
        }

        let resp_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse {} response: {}", entry.kind, e))?;

        entry.kind.parse_response(&resp_json)
    }

    /// Streams tokens from the backend. The last item is always either
    /// `Finished` carrying the log entry or `Failed` followed by `Finished`.
    pub fn into_stream(
        self,
        entry: RegistryEntry,
        request: GenerateRequest,
    ) -> impl Stream<Item = StreamItem> + Send + 'static {
        let budget = self.timeout_for(&entry, &request);
        let client = self.client;

        stream! {
            let started = Instant::now();
            let kind = entry.kind;

            let fail = |message: String| {
                let latency_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(registry_id = %entry.id, error = %message, "streaming generation failed");
                let log_entry = InteractionLogEntry::failure(
                    &entry.id,
                    &request.model_name,
                    &request.prompt,
                    &message,
                    latency_ms,
                );
                (ErrorDetail::from(&ProxyError::Upstream(message)), log_entry)
            };

            if !kind.supports_streaming() {
                let (detail, log_entry) = fail(format!("streaming is not supported for {} backends", kind));
                yield StreamItem::Failed(detail);
                yield StreamItem::Finished(log_entry);
                return;
            }

            let params = request.gen_params.resolve(&entry.generation_defaults);
            let body = kind.build_request(&request.model_name, &request.prompt, &params, true);
            let mut call = client.post(kind.generate_url(&entry.endpoint_url)).json(&body);
            if let Some(token) = entry.auth_token.as_deref() {
                call = call.bearer_auth(token);
            }

            let response = match timeout(budget, call.send()).await {
                Ok(Ok(r)) => r,
                Ok(Err(e)) => {
                    let (detail, log_entry) = fail(format!("{} stream failed: {}", kind, e));
                    yield StreamItem::Failed(detail);
                    yield StreamItem::Finished(log_entry);
                    return;
                }
                Err(_) => {
                    let (detail, log_entry) = fail(format!("{} stream timed out after {} ms", kind, budget.as_millis()));
                    yield StreamItem::Failed(detail);
                    yield StreamItem::Finished(log_entry);
                    return;
                }
            };

            if !response.status().is_success() {
                let (detail, log_entry) = fail(format!("{} API error: {}", kind, response.status()));
                yield StreamItem::Failed(detail);
                yield StreamItem::Finished(log_entry);
                return;
            }

            let mut byte_stream = response.bytes_stream();
            let mut buffer = Vec::new();
            let mut text = String::new();
            let mut token_id = 0u32;
            let mut token_count = None;
            let mut eof = false;

            loop {
                match timeout(budget, byte_stream.next()).await {
                    Ok(Some(Ok(chunk))) => buffer.extend_from_slice(&chunk),
                    Ok(Some(Err(e))) => {
                        let (detail, log_entry) = fail(format!("{} read error: {}", kind, e));
                        yield StreamItem::Failed(detail);
                        yield StreamItem::Finished(log_entry);
                        return;
                    }
                    Ok(None) if buffer.is_empty() => break,
                    // The last line may arrive without a trailing newline.
                    Ok(None) => {
                        buffer.push(b'\n');
                        eof = true;
                    }
                    Err(_) => {
                        let (detail, log_entry) = fail(format!("{} stream stalled for {} ms", kind, budget.as_millis()));
                        yield StreamItem::Failed(detail);
                        yield StreamItem::Finished(log_entry);
                        return;
                    }
                }

                let mut finished = false;
                while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                    let line = String::from_utf8_lossy(&buffer[..pos]).to_string();
                    buffer.drain(..=pos);

                    let Some(parsed) = kind.parse_stream_line(&line) else {
                        continue;
                    };

                    text.push_str(&parsed.token);
                    if parsed.token_count.is_some() {
                        token_count = parsed.token_count;
                    }
                    if !parsed.token.is_empty() || parsed.done {
                        yield StreamItem::Token(StreamToken {
                            token: parsed.token,
                            token_id,
                            complete: parsed.done,
                        });
                        token_id += 1;
                    }
                    if parsed.done {
                        finished = true;
                        break;
                    }
                }

                if finished || eof {
                    break;
                }
            }

            let latency_ms = started.elapsed().as_millis() as u64;
            tracing::info!(registry_id = %entry.id, latency_ms, tokens = token_id, "streaming generation finished");
            yield StreamItem::Finished(InteractionLogEntry::success(
                &entry.id,
                &request.model_name,
                &request.prompt,
                &text,
                latency_ms,
                token_count,
            ));
        }
    }
}
