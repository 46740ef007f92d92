use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::CanvasError;

/// Deployment environment. `Dev` leaves administrative tools enabled for
/// local iteration; `Prod` is the gate `maintenance_agent` checks before
/// exposing `update_codebase` / `restart_application`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunEnv {
    #[default]
    Dev,
    Prod,
}

impl std::str::FromStr for RunEnv {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(RunEnv::Dev),
            "prod" => Ok(RunEnv::Prod),
            other => Err(format!("unknown ENV value: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// The `tracing_subscriber::EnvFilter` directive this level maps to.
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "skynet_gateway=debug,tower_http=debug",
            LogLevel::Info => "skynet_gateway=info,tower_http=info",
            LogLevel::Warning => "skynet_gateway=warn,tower_http=warn",
            LogLevel::Error => "skynet_gateway=error,tower_http=error",
        }
    }
}

/// Top-level configuration (`canvas.toml` + unprefixed env overrides, per
/// spec §6 — the recognised options are read straight from the process
/// environment rather than a `SKYNET_`-style prefix since this runtime is
/// a single deployable, not a multi-tenant gateway with other namespaced
/// subsystems).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    #[serde(default)]
    pub env: RunEnv,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_session_db_path")]
    pub session_db_path: String,
    #[serde(default = "default_media_path")]
    pub media_path: String,
    #[serde(default = "default_images_path")]
    pub images_path: String,
    #[serde(default = "default_docs_path")]
    pub docs_path: String,
    /// Required: startup fails with `FatalConfig` if absent.
    pub google_api_key: Option<String>,
    #[serde(default = "default_model_fast")]
    pub gemini_model_fast: String,
    #[serde(default = "default_model_smart")]
    pub gemini_model_smart: String,
    /// Comma-separated in the environment; empty means all chats allowed.
    #[serde(default)]
    pub telegram_allowed_chat_ids: Vec<String>,
    #[serde(default)]
    pub bot_silent_mode: bool,
}

fn default_db_path() -> String {
    "data/canvas.db".to_string()
}
fn default_session_db_path() -> String {
    "data/sessions.db".to_string()
}
fn default_media_path() -> String {
    "data/media".to_string()
}
fn default_images_path() -> String {
    "data/images".to_string()
}
fn default_docs_path() -> String {
    "data/docs".to_string()
}
fn default_model_fast() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_model_smart() -> String {
    "gemini-1.5-pro".to_string()
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            env: RunEnv::Dev,
            log_level: LogLevel::Info,
            db_path: default_db_path(),
            session_db_path: default_session_db_path(),
            media_path: default_media_path(),
            images_path: default_images_path(),
            docs_path: default_docs_path(),
            google_api_key: None,
            gemini_model_fast: default_model_fast(),
            gemini_model_smart: default_model_smart(),
            telegram_allowed_chat_ids: Vec::new(),
            bot_silent_mode: false,
        }
    }
}

impl CanvasConfig {
    /// Load config from an optional TOML file, merged with env var
    /// overrides (`ENV`, `LOG_LEVEL`, `DB_PATH`, …, as enumerated in spec §6).
    ///
    /// `TELEGRAM_ALLOWED_CHAT_IDS` is split on commas by hand since figment's
    /// `Env` provider treats a bare string as a scalar, not a list.
    pub fn load(config_path: Option<&str>) -> Result<Self, CanvasError> {
        let mut figment = Figment::new();
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::raw());

        let mut config: CanvasConfig = figment
            .extract()
            .map_err(|e| CanvasError::FatalConfig(e.to_string()))?;

        if let Ok(raw) = std::env::var("TELEGRAM_ALLOWED_CHAT_IDS") {
            config.telegram_allowed_chat_ids = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Ok(config)
    }

    /// Validate required fields. Called once at process startup; a failure
    /// here is a `FatalConfig` and the binary exits non-zero.
    pub fn validate(&self) -> Result<(), CanvasError> {
        if self
            .google_api_key
            .as_ref()
            .map(|k| k.trim().is_empty())
            .unwrap_or(true)
        {
            return Err(CanvasError::FatalConfig(
                "GOOGLE_API_KEY is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `chat_id` is allowed to talk to the bot. Empty allowlist
    /// means all chats are allowed.
    pub fn chat_allowed(&self, chat_id: &str) -> bool {
        self.telegram_allowed_chat_ids.is_empty()
            || self
                .telegram_allowed_chat_ids
                .iter()
                .any(|id| id == chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_requires_api_key() {
        let cfg = CanvasConfig::default();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_passes_with_key() {
        let mut cfg = CanvasConfig::default();
        cfg.google_api_key = Some("key".to_string());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_allowlist_allows_all() {
        let cfg = CanvasConfig::default();
        assert!(cfg.chat_allowed("anything"));
    }

    #[test]
    fn nonempty_allowlist_restricts() {
        let mut cfg = CanvasConfig::default();
        cfg.telegram_allowed_chat_ids = vec!["42".to_string()];
        assert!(cfg.chat_allowed("42"));
        assert!(!cfg.chat_allowed("43"));
    }
}
