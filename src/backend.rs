//! Wire translation for each supported backend flavor.
//!
//! Every [`BackendKind`] knows its health path, how to turn a normalized
//! generation request into its own JSON body, and how to pull text, token
//! counts and timings back out of whatever the backend answered.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "ollama-like")]
    Ollama,
    #[serde(rename = "llamacpp-like")]
    LlamaCpp,
    #[serde(rename = "openai-like")]
    OpenAi,
    #[serde(rename = "generic-http")]
    GenericHttp,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Ollama,
        BackendKind::LlamaCpp,
        BackendKind::OpenAi,
        BackendKind::GenericHttp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "ollama-like",
            BackendKind::LlamaCpp => "llamacpp-like",
            BackendKind::OpenAi => "openai-like",
            BackendKind::GenericHttp => "generic-http",
        }
    }

    /// Path appended to the endpoint URL when probing. `None` means the bare
    /// endpoint URL is probed.
    pub fn health_path(&self) -> Option<&'static str> {
        match self {
            BackendKind::Ollama => Some("/api/tags"),
            BackendKind::LlamaCpp => Some("/health"),
            BackendKind::OpenAi => Some("/v1/models"),
            BackendKind::GenericHttp => None,
        }
    }

    pub fn generate_path(&self) -> Option<&'static str> {
        match self {
            BackendKind::Ollama => Some("/api/generate"),
            BackendKind::LlamaCpp => Some("/completion"),
            BackendKind::OpenAi => Some("/v1/chat/completions"),
            BackendKind::GenericHttp => None,
        }
    }

    pub fn health_url(&self, endpoint_url: &str) -> String {
        join_url(endpoint_url, self.health_path())
    }

    pub fn generate_url(&self, endpoint_url: &str) -> String {
        join_url(endpoint_url, self.generate_path())
    }

    pub fn build_request(
        &self,
        model: &str,
        prompt: &str,
        params: &ResolvedParams,
        stream: bool,
    ) -> Value {
        match self {
            BackendKind::Ollama => to_value(&OllamaGenerateRequest {
                model: model.to_string(),
                prompt: prompt.to_string(),
                stream,
                options: OllamaOptions {
                    num_predict: params.max_tokens,
                    temperature: params.temperature,
                    top_p: params.top_p,
                },
            }),
            BackendKind::LlamaCpp => serde_json::json!({
                "prompt": prompt,
                "n_predict": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p,
                "stream": stream
            }),
            BackendKind::OpenAi => to_value(&OpenAiChatCompletionRequest {
                model: model.to_string(),
                messages: vec![ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                }],
                max_tokens: params.max_tokens,
                temperature: params.temperature,
                top_p: params.top_p,
                stream,
            }),
            BackendKind::GenericHttp => serde_json::json!({
                "model": model,
                "prompt": prompt,
                "max_tokens": params.max_tokens,
                "temperature": params.temperature,
                "top_p": params.top_p
            }),
        }
    }

    pub fn parse_response(&self, body: &Value) -> Result<Completion, String> {
        match self {
            BackendKind::Ollama => {
                let resp: OllamaGenerateResponse = serde_json::from_value(body.clone())
                    .map_err(|e| format!("Invalid ollama response format: {}", e))?;
                Ok(Completion {
                    text: resp.response,
                    token_count: resp.eval_count,
                    backend_duration_ms: resp.total_duration.map(|ns| ns / 1_000_000),
                })
            }
            BackendKind::LlamaCpp => {
                let text = body["content"]
                    .as_str()
                    .ok_or("Invalid llama.cpp response format")?
                    .to_string();
                Ok(Completion {
                    text,
                    token_count: body["tokens_predicted"].as_u64(),
                    backend_duration_ms: body["timings"]["predicted_ms"]
                        .as_f64()
                        .map(|ms| ms.max(0.0).round() as u64),
                })
            }
            BackendKind::OpenAi => {
                let text = body["choices"][0]["message"]["content"]
                    .as_str()
                    .ok_or("Invalid chat completion response format")?
                    .to_string();
                Ok(Completion {
                    text,
                    token_count: body["usage"]["completion_tokens"].as_u64(),
                    backend_duration_ms: None,
                })
            }
            BackendKind::GenericHttp => {
                let text = ["text", "response", "content", "output", "generated_text"]
                    .iter()
                    .find_map(|key| body[*key].as_str())
                    .ok_or("Invalid response format: no text field")?
                    .to_string();
                let token_count = ["token_count", "tokens", "eval_count"]
                    .iter()
                    .find_map(|key| body[*key].as_u64());
                Ok(Completion {
                    text,
                    token_count,
                    backend_duration_ms: body["duration_ms"].as_u64(),
                })
            }
        }
    }

    /// Parses one line of a streaming response. Returns `None` for lines that
    /// carry no token (keep-alives, blank lines, unparseable chunks).
    pub fn parse_stream_line(&self, line: &str) -> Option<StreamChunk> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match self {
            BackendKind::Ollama => {
                let resp: OllamaStreamChunk = serde_json::from_str(line).ok()?;
                Some(StreamChunk {
                    token: resp.response,
                    done: resp.done,
                    token_count: resp.eval_count,
                })
            }
            BackendKind::LlamaCpp => {
                let data = line.strip_prefix("data:")?.trim_start();
                let resp: Value = serde_json::from_str(data).ok()?;
                Some(StreamChunk {
                    token: resp["content"].as_str().unwrap_or("").to_string(),
                    done: resp["stop"].as_bool().unwrap_or(false),
                    token_count: resp["tokens_predicted"].as_u64(),
                })
            }
            BackendKind::OpenAi => {
                let data = line.strip_prefix("data:")?.trim_start();
                if data == "[DONE]" {
                    return Some(StreamChunk {
                        token: String::new(),
                        done: true,
                        token_count: None,
                    });
                }
                let resp: Value = serde_json::from_str(data).ok()?;
                let choice = resp["choices"].as_array()?.first()?;
                let token = choice["delta"]["content"].as_str().unwrap_or("");
                let done = !choice["finish_reason"].is_null();
                if token.is_empty() && !done {
                    return None;
                }
                Some(StreamChunk {
                    token: token.to_string(),
                    done,
                    token_count: resp["usage"]["completion_tokens"].as_u64(),
                })
            }
            BackendKind::GenericHttp => None,
        }
    }

    pub fn supports_streaming(&self) -> bool {
        !matches!(self, BackendKind::GenericHttp)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown backend kind '{0}', expected one of: ollama-like, llamacpp-like, openai-like, generic-http")]
pub struct UnknownKind(pub String);

impl FromStr for BackendKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Generation parameters after request values, entry defaults and fallback
/// constants have been merged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParams {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for ResolvedParams {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub token_count: Option<u64>,
    pub backend_duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    pub token: String,
    pub done: bool,
    pub token_count: Option<u64>,
}

fn join_url(endpoint_url: &str, path: Option<&str>) -> String {
    let base = endpoint_url.trim_end_matches('/');
    match path {
        Some(path) => format!("{}{}", base, path),
        None => endpoint_url.to_string(),
    }
}

fn to_value<T: Serialize>(body: &T) -> Value {
    // Plain structs of strings and numbers always serialize.
    serde_json::to_value(body).unwrap_or(Value::Null)
}

#[derive(Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f64,
    top_p: f64,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    total_duration: Option<u64>,
}

#[derive(Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Serialize)]
struct OpenAiChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}
