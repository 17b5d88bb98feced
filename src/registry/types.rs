use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use url::Url;

use crate::backend::{BackendKind, ResolvedParams, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TOP_P};
use crate::error::ApiError;

/// Probe timeout used when an entry does not configure one.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Online,
    #[default]
    Offline,
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Online => "online",
            HealthStatus::Offline => "offline",
            HealthStatus::Error => "error",
        })
    }
}

/// Optional generation knobs. Used both for per-entry defaults and for the
/// per-request overrides sent to the generation proxy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl GenerationParams {
    /// Merges `self` (the request) over `defaults` (the entry) over the
    /// fallback constants.
    pub fn resolve(&self, defaults: &GenerationParams) -> ResolvedParams {
        ResolvedParams {
            max_tokens: self
                .max_tokens
                .or(defaults.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: self
                .temperature
                .or(defaults.temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
            top_p: self.top_p.or(defaults.top_p).unwrap_or(DEFAULT_TOP_P),
        }
    }

    pub fn timeout_ms_over(&self, defaults: &GenerationParams) -> Option<u64> {
        self.timeout_ms.or(defaults.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub id: String,
    pub display_name: String,
    pub kind: BackendKind,
    pub endpoint_url: String,
    #[serde(rename = "hasAuthToken", serialize_with = "serialize_presence")]
    pub auth_token: Option<String>,
    pub generation_defaults: GenerationParams,
    pub last_known_status: HealthStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegistryEntry {
    pub fn probe_timeout_ms(&self) -> u64 {
        self.generation_defaults
            .timeout_ms
            .unwrap_or(DEFAULT_PROBE_TIMEOUT_MS)
    }
}

fn serialize_presence<S: Serializer>(token: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_bool(token.as_deref().is_some_and(|t| !t.is_empty()))
}

/// Body of `POST /v1/registry`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub endpoint_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub generation_defaults: Option<GenerationParams>,
}

/// Body of `PUT /v1/registry`. An omitted `authToken` keeps the stored one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryUpdate {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub fields: NewEntry,
}

/// Validated form of [`NewEntry`].
#[derive(Debug, Clone)]
pub struct EntryFields {
    pub display_name: String,
    pub kind: BackendKind,
    pub endpoint_url: String,
    pub auth_token: Option<String>,
    pub generation_defaults: GenerationParams,
}

impl NewEntry {
    pub fn validate(self) -> Result<EntryFields, ApiError> {
        let display_name = self.display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(ApiError::Validation("displayName is required".to_string()));
        }

        if self.kind.trim().is_empty() {
            return Err(ApiError::Validation("kind is required".to_string()));
        }
        let kind = self
            .kind
            .parse::<BackendKind>()
            .map_err(|e| ApiError::Validation(e.to_string()))?;

        let endpoint_url = self.endpoint_url.trim().to_string();
        if endpoint_url.is_empty() {
            return Err(ApiError::Validation("endpointUrl is required".to_string()));
        }
        let parsed = Url::parse(&endpoint_url)
            .map_err(|e| ApiError::Validation(format!("endpointUrl is not a valid URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::Validation(format!(
                "endpointUrl must use http or https, got '{}'",
                parsed.scheme()
            )));
        }

        let defaults = self.generation_defaults.unwrap_or_default();
        if let Some(t) = defaults.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ApiError::Validation("temperature must be within 0..=2".to_string()));
            }
        }
        if let Some(p) = defaults.top_p {
            if !(0.0..=1.0).contains(&p) {
                return Err(ApiError::Validation("topP must be within 0..=1".to_string()));
            }
        }

        Ok(EntryFields {
            display_name,
            kind,
            endpoint_url,
            auth_token: self.auth_token.filter(|t| !t.is_empty()),
            generation_defaults: defaults,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_entry(name: &str, kind: &str, url: &str) -> NewEntry {
        NewEntry {
            display_name: name.to_string(),
            kind: kind.to_string(),
            endpoint_url: url.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn validation_requires_fields() {
        assert!(matches!(
            new_entry("", "ollama-like", "http://x").validate(),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            new_entry("Local", "", "http://x").validate(),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            new_entry("Local", "ollama-like", "").validate(),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            new_entry("Local", "ollama-like", "ftp://x").validate(),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            new_entry("Local", "mystery", "http://x").validate(),
            Err(ApiError::Validation(_))
        ));

        let fields = new_entry(" Local ", "ollama-like", "http://x").validate().unwrap();
        assert_eq!(fields.display_name, "Local");
        assert_eq!(fields.kind, BackendKind::Ollama);
    }

    #[test]
    fn request_params_win_over_entry_defaults() {
        let request = GenerationParams {
            max_tokens: Some(10),
            ..Default::default()
        };
        let defaults = GenerationParams {
            max_tokens: Some(500),
            temperature: Some(0.2),
            ..Default::default()
        };
        let resolved = request.resolve(&defaults);
        assert_eq!(resolved.max_tokens, 10);
        assert_eq!(resolved.temperature, 0.2);
        assert_eq!(resolved.top_p, DEFAULT_TOP_P);
    }

    #[test]
    fn auth_token_is_never_serialized() {
        let now = Utc::now();
        let entry = RegistryEntry {
            id: "a".into(),
            display_name: "Local".into(),
            kind: BackendKind::Ollama,
            endpoint_url: "http://x".into(),
            auth_token: Some("secret".into()),
            generation_defaults: GenerationParams::default(),
            last_known_status: HealthStatus::Offline,
            last_checked_at: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["hasAuthToken"], true);
        assert_eq!(json["kind"], "ollama-like");
        assert_eq!(json["lastKnownStatus"], "offline");
        assert!(!json.to_string().contains("secret"));
    }
}
