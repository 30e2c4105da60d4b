use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `client.api_key`.
pub const API_KEY_ENV: &str = "GPTODO_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the backend delivers its answer.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// `text/event-stream` with thought and answer records.
    #[default]
    Stream,
    /// A single JSON array of `{text}`.
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub mode: ResponseMode,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            mode: ResponseMode::default(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Bearer token for the backend: `GPTODO_API_KEY` wins over the file.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8787/process-image".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default = "default_container")]
    pub container: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            container: default_container(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./data/gptodo.sqlite")
}
fn default_container() -> String {
    gptodo_core::cache::CACHE_NAME.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Origins echoed back in `Access-Control-Allow-Origin`. The first entry
    /// is sent to every other origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub mode: ResponseMode,
    /// When set, requests must carry `Authorization: Bearer <token>`.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: default_allowed_origins(),
            mode: ResponseMode::default(),
            auth_token: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_model_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_thinking_budget")]
    pub thinking_budget: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_model_name(),
            api_key_env: default_model_key_env(),
            thinking_budget: default_thinking_budget(),
            temperature: 0.0,
            base_url: default_model_base_url(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model_name() -> String {
    "gemini-2.5-pro".to_string()
}
fn default_model_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_thinking_budget() -> u32 {
    1024
}
fn default_model_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load the config file if it exists, otherwise fall back to defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.client.endpoint.trim().is_empty() {
        anyhow::bail!("client.endpoint must not be empty");
    }

    if config.cache.container.trim().is_empty() {
        anyhow::bail!("cache.container must not be empty");
    }

    if config.server.allowed_origins.is_empty() {
        anyhow::bail!("server.allowed_origins must list at least one origin");
    }

    match config.model.provider.as_str() {
        "gemini" => {}
        other => anyhow::bail!("Unknown model provider: '{}'. Must be gemini.", other),
    }

    if !(0.0..=2.0).contains(&config.model.temperature) {
        anyhow::bail!("model.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
