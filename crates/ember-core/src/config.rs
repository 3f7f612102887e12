//! Configuration resolution for Ember.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/ember/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)
//!
//! Files are merged key by key, so a file only needs to name the values it
//! changes. Secrets (JWT secret, upstream API key) are never read from files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete Ember configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

/// HTTP listener and storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub database_path: Option<PathBuf>,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            database_path: None,
            cors_origins: Vec::new(),
        }
    }
}

/// Generative-AI upstream configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of an OpenAI-compatible API, without the trailing `/chat/completions`.
    pub base_url: String,
    pub default_model: String,
    pub system_prompt: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            default_model: "gpt-4o-mini".to_string(),
            system_prompt: None,
            connect_timeout_secs: 10,
        }
    }
}

/// Stream relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Frames buffered between the relay task and the response body.
    pub channel_capacity: usize,
    /// Interval between SSE keep-alive comments.
    pub keep_alive_secs: u64,
    /// Prior messages sent upstream as conversation context.
    pub history_limit: u32,
    /// Replace upstream error details in `error` frames with a generic message.
    pub mask_errors: bool,
    pub selftest_max_count: u32,
    pub selftest_min_interval_ms: u64,
    pub selftest_default_count: u32,
    pub selftest_default_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 16,
            keep_alive_secs: 15,
            history_limit: 20,
            mask_errors: false,
            selftest_max_count: 200,
            selftest_min_interval_ms: 10,
            selftest_default_count: 10,
            selftest_default_interval_ms: 100,
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// `explicit` names a config file that must exist; the global file is
/// optional.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        merge_json(&mut merged, read_config_value(&global_path)?);
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }
        merge_json(&mut merged, read_config_value(path)?);
    }

    let mut config: Config = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("settings.json"))
}

/// Get the default database path for the server.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("ember.db"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".ember"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/ember"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("ember"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn read_config_value(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Recursively overlay `overlay` onto `base`. Objects merge per key; any
/// other value replaces what was there.
fn merge_json(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Apply `EMBER_*` overrides. `lookup` is `std::env::var` in production.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("EMBER_ADDR") {
        config.server.addr = val;
    }
    if let Some(val) = lookup("EMBER_DATABASE_PATH") {
        config.server.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("EMBER_CORS_ORIGINS") {
        config.server.cors_origins = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(val) = lookup("EMBER_UPSTREAM_BASE_URL") {
        config.upstream.base_url = val;
    }
    if let Some(val) = lookup("EMBER_UPSTREAM_MODEL") {
        config.upstream.default_model = val;
    }
    if let Some(val) = lookup("EMBER_SYSTEM_PROMPT") {
        config.upstream.system_prompt = Some(val);
    }
    if let Some(n) = lookup("EMBER_RELAY_CHANNEL_CAPACITY").and_then(|v| v.parse().ok()) {
        config.relay.channel_capacity = n;
    }
    if let Some(flag) = lookup("EMBER_MASK_ERRORS").and_then(|v| parse_bool(&v)) {
        config.relay.mask_errors = flag;
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_selftest_caps() {
        let config = Config::default();
        assert_eq!(config.relay.selftest_max_count, 200);
        assert_eq!(config.relay.selftest_min_interval_ms, 10);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"relay": {"channel_capacity": 4}}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.relay.channel_capacity, 4);
        assert_eq!(config.relay.keep_alive_secs, 15);
        assert_eq!(config.upstream, UpstreamConfig::default());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(Error::Config(_))));
    }

    #[test]
    fn merge_json_is_deep() {
        let mut base = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 3});
        merge_json(&mut base, serde_json::json!({"a": {"y": 20}, "c": 4}));
        assert_eq!(base, serde_json::json!({"a": {"x": 1, "y": 20}, "b": 3, "c": 4}));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("EMBER_ADDR", "127.0.0.1:9000"),
            ("EMBER_UPSTREAM_MODEL", "local-model"),
            ("EMBER_CORS_ORIGINS", "https://a.example, https://b.example,"),
            ("EMBER_RELAY_CHANNEL_CAPACITY", "not-a-number"),
            ("EMBER_MASK_ERRORS", "yes"),
        ]);
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.server.addr, "127.0.0.1:9000");
        assert_eq!(config.upstream.default_model, "local-model");
        assert_eq!(
            config.server.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.relay.channel_capacity, 16);
        assert!(config.relay.mask_errors);
    }
}
