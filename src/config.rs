use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{NavError, NavResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub mission: MissionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub active_provider: String,
    pub providers: HashMap<String, ProviderEntry>,
    /// Provider+model used for the navigation query. Falls back to active_provider defaults.
    #[serde(default)]
    pub vision: Option<VisionRole>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderEntry {
                display_name: "OpenAI".to_string(),
                api_base: "https://api.openai.com/v1/chat/completions".to_string(),
                model: "gpt-4o".to_string(),
                temperature: default_temperature(),
                api_key: None,
            },
        );
        Self {
            active_provider: "openai".to_string(),
            providers,
            vision: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Full chat-completions endpoint URL.
    pub api_base: String,
    /// Default model for this provider (used when no vision role is configured).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (falls back to env var DRONE_NAV_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionRole {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature.
    pub temperature: Option<f64>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_detail")]
    pub detail: String,
}

fn default_temperature() -> f64 {
    0.0
}

pub(crate) fn default_max_tokens() -> u32 {
    100
}

pub(crate) fn default_detail() -> String {
    "auto".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_action_log")]
    pub action_log: String,
    #[serde(default = "default_last_success")]
    pub last_success: String,
    #[serde(default = "default_arrivals")]
    pub arrivals: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
            action_log: default_action_log(),
            last_success: default_last_success(),
            arrivals: default_arrivals(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_action_log() -> String {
    "action_log.json".to_string()
}

fn default_last_success() -> String {
    "last_success.json".to_string()
}

fn default_arrivals() -> String {
    "arrivals.json".to_string()
}

/// Fallback image and target used when the CLI omits them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MissionConfig {
    pub image: Option<PathBuf>,
    pub target: Option<String>,
}

fn resolve_config_path(explicit: Option<&Path>) -> NavResult<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(NavError::Config(format!(
            "config file {} does not exist",
            path.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("drone-nav").join("config.toml");
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(NavError::ConfigNotFound(
        "config.toml not found next to executable, in working directory or user config dir".into(),
    ))
}

pub fn parse_config(content: &str) -> NavResult<AppConfig> {
    Ok(toml::from_str(content)?)
}

/// Loads `config.toml`. `explicit` wins over the search path and must exist.
pub fn load_config(explicit: Option<&Path>) -> NavResult<AppConfig> {
    let path = resolve_config_path(explicit)?;
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

/// Like [`load_config`], but an absent config on the search path yields the
/// built-in defaults. Unreadable or malformed files still fail.
pub fn load_config_or_default(explicit: Option<&Path>) -> NavResult<AppConfig> {
    default_when_missing(load_config(explicit))
}

fn default_when_missing(loaded: NavResult<AppConfig>) -> NavResult<AppConfig> {
    match loaded {
        Err(NavError::ConfigNotFound(reason)) => {
            tracing::warn!(%reason, "no config loaded; using built-in defaults");
            Ok(AppConfig::default())
        }
        other => other,
    }
}
