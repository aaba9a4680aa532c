// src/config.rs
//! Explicit runtime configuration, resolved once at startup.
//!
//! Components never read environment variables per call: everything they
//! need arrives through [`AppConfig`] at construction. Secrets use the
//! `"ENV"` marker indirection: `api_key = "ENV"` means "read the value from
//! the conventional environment variable at load time". A missing secret
//! resolves to an empty string and surfaces later as a Configuration error
//! on the call that needs it; startup itself never crashes over it.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const ENV_CONFIG_PATH: &str = "TICKET_LOAD_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/ticket-load.toml";

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_JIRA_BASE_URL: &str = "JIRA_BASE_URL";
pub const ENV_JIRA_EMAIL: &str = "JIRA_EMAIL";
pub const ENV_JIRA_API_TOKEN: &str = "JIRA_API_TOKEN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ai: AiConfig,
    pub jira: JiraConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the HTTP surface.
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// "openai" (case-insensitive). Kept as a field so a second provider can
    /// slot in without a config format change.
    pub provider: String,
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY.
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JiraConfig {
    /// Site base URL, e.g. "https://your-site.atlassian.net".
    /// "ENV" means: read from JIRA_BASE_URL.
    pub base_url: String,
    /// "ENV" means: read from JIRA_EMAIL.
    pub email: String,
    /// "ENV" means: read from JIRA_API_TOKEN.
    pub api_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory for the file-backed score store.
    pub dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: "ENV".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            base_url: "ENV".to_string(),
            email: "ENV".to_string(),
            api_token: "ENV".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/scores"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            ai: AiConfig::default(),
            jira: JiraConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration using env var + fallbacks:
    /// 1) $TICKET_LOAD_CONFIG_PATH (must exist if set)
    /// 2) config/ticket-load.toml
    /// 3) config/ticket-load.json
    /// 4) built-in defaults
    ///
    /// Secrets are resolved after parsing, in all cases.
    pub fn load() -> Result<Self> {
        if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from_file(&pb);
        }
        let toml_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if toml_p.exists() {
            return Self::load_from_file(&toml_p);
        }
        let json_p = PathBuf::from("config/ticket-load.json");
        if json_p.exists() {
            return Self::load_from_file(&json_p);
        }
        let mut cfg = Self::default();
        cfg.resolve_secrets();
        Ok(cfg)
    }

    /// Load from an explicit path. Supports TOML or JSON, chosen by the file
    /// extension with a fallback attempt at the other format.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, ext.as_str())?;
        cfg.resolve_secrets();
        Ok(cfg)
    }

    /// Replace every `"ENV"` marker with the conventional environment
    /// variable. Missing variables resolve to empty strings; the component
    /// that needs the value reports the Configuration error at call time.
    fn resolve_secrets(&mut self) {
        self.ai.provider = self.ai.provider.to_lowercase();
        resolve_marker(&mut self.ai.api_key, ENV_OPENAI_API_KEY);
        resolve_marker(&mut self.jira.base_url, ENV_JIRA_BASE_URL);
        resolve_marker(&mut self.jira.email, ENV_JIRA_EMAIL);
        resolve_marker(&mut self.jira.api_token, ENV_JIRA_API_TOKEN);
    }
}

fn resolve_marker(slot: &mut String, var: &str) {
    if !slot.trim().eq_ignore_ascii_case("env") {
        return;
    }
    match env::var(var) {
        Ok(v) => *slot = v,
        Err(_) => {
            warn!("{var} is not set; the dependent operation will report it");
            *slot = String::new();
        }
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AppConfig> {
    let try_toml_first = hint_ext == "toml" || !s.trim_start().starts_with('{');
    if try_toml_first {
        if let Ok(cfg) = toml::from_str::<AppConfig>(s) {
            return Ok(cfg);
        }
        if let Ok(cfg) = serde_json::from_str::<AppConfig>(s) {
            return Ok(cfg);
        }
    } else {
        if let Ok(cfg) = serde_json::from_str::<AppConfig>(s) {
            return Ok(cfg);
        }
        if let Ok(cfg) = toml::from_str::<AppConfig>(s) {
            return Ok(cfg);
        }
    }
    Err(anyhow!("unsupported config format"))
}
