//! Runtime settings with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`MuxSettings::default()`]
//! 2. If `~/.mux/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `MUX_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when loading or parsing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file from disk.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the settings file.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which orchestrator drives a turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestrationMode {
    /// Fan the turn out to every configured agent.
    #[default]
    Concurrent,
    /// Route the turn to the echo agent alone.
    Single,
}

/// Root settings type for the mux runtime.
///
/// Loaded from `~/.mux/settings.json` with defaults applied for missing
/// fields. All field names are camelCase in JSON; environment variables
/// can override specific values. Example:
///
/// ```json
/// {
///   "mode": "concurrent",
///   "fetch": { "url": "https://example.com/" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MuxSettings {
    /// Orchestration mode for new turns.
    pub mode: OrchestrationMode,
    /// Echo agent settings.
    pub echo: EchoSettings,
    /// HTTP snippet agent settings.
    pub fetch: FetchSettings,
    /// Model-backed agent provider settings.
    pub model: ModelSettings,
}

/// Echo agent settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EchoSettings {
    /// Display name attributed to the agent's events.
    pub name: String,
    /// Pause between streamed words in milliseconds.
    pub word_delay_ms: u64,
}

impl Default for EchoSettings {
    fn default() -> Self {
        Self {
            name: "Echoer".to_string(),
            word_delay_ms: 40,
        }
    }
}

/// HTTP snippet agent settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchSettings {
    /// Display name attributed to the agent's events.
    pub name: String,
    /// URL fetched each turn.
    pub url: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Pause between streamed chunks in milliseconds.
    pub chunk_delay_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            name: "Fetcher".to_string(),
            url: "https://example.com/".to_string(),
            timeout_ms: 3000,
            chunk_delay_ms: 55,
        }
    }
}

/// Model-backed agent provider settings.
///
/// The concrete network provider is supplied by the embedder; these values
/// describe which upstream it should talk to.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    /// Provider identifier (e.g. `openai`, `azure`).
    pub provider: String,
    /// Model or deployment name.
    pub model: String,
    /// Optional non-default API endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// API key; usually supplied via `MUX_API_KEY` rather than the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// System prompt seeding every session's history.
    pub system_prompt: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            endpoint: None,
            api_key: None,
            system_prompt: "You are a concise, helpful assistant.".to_string(),
        }
    }
}

/// Resolve the path to the settings file (`~/.mux/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".mux").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<MuxSettings, SettingsError> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<MuxSettings, SettingsError> {
    let defaults = serde_json::to_value(MuxSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: MuxSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Integers must be valid and within the specified range; invalid values
/// are silently ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut MuxSettings) {
    if let Some(v) = read_env_string("MUX_MODE") {
        if let Some(mode) = parse_mode(&v) {
            settings.mode = mode;
        } else {
            tracing::warn!(key = "MUX_MODE", value = %v, "invalid mode env var, ignoring");
        }
    }
    if let Some(v) = read_env_u64("MUX_ECHO_DELAY_MS", 0, 60_000) {
        settings.echo.word_delay_ms = v;
    }
    if let Some(v) = read_env_string("MUX_FETCH_URL") {
        settings.fetch.url = v;
    }
    if let Some(v) = read_env_u64("MUX_FETCH_TIMEOUT_MS", 100, 600_000) {
        settings.fetch.timeout_ms = v;
    }
    if let Some(v) = read_env_string("MUX_PROVIDER") {
        settings.model.provider = v;
    }
    if let Some(v) = read_env_string("MUX_MODEL") {
        settings.model.model = v;
    }
    if let Some(v) = read_env_string("MUX_ENDPOINT") {
        settings.model.endpoint = Some(v);
    }
    if let Some(v) = read_env_string("MUX_API_KEY") {
        settings.model.api_key = Some(v);
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse an orchestration mode name (case-insensitive).
pub fn parse_mode(val: &str) -> Option<OrchestrationMode> {
    match val.to_lowercase().as_str() {
        "concurrent" => Some(OrchestrationMode::Concurrent),
        "single" => Some(OrchestrationMode::Single),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
