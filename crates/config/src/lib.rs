//! BenchPilot configuration
//!
//! Loads and saves LLM credentials, agent budgets and bench addresses.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{config_path, data_dir, expand_home, logs_dir, workspace_path};

/// Environment variables that override the LLM section
pub const ENV_API_BASE: &str = "API_BASE";
pub const ENV_API_KEY: &str = "API_KEY";
pub const ENV_API_MODEL: &str = "API_MODEL";

/// Errors in configuration systems
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("CONFIG I/O ERROR: {0}")]
    Io(#[from] std::io::Error),

    #[error("CONFIG PARSE FAILED: {0}")]
    Json(#[from] serde_json::Error),

    #[error("NO API KEY: set API_KEY or llm.api_key in the config file")]
    MissingApiKey,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// LLM endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.0
}

/// Agent loop budgets and prompt sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_execution_secs")]
    pub max_execution_secs: u64,
    #[serde(default = "default_history_max_messages")]
    pub history_max_messages: usize,
    /// Replaces the built-in agent prompt when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<String>,
    #[serde(default = "default_waveform_dir")]
    pub waveform_dir: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_execution_secs: default_max_execution_secs(),
            history_max_messages: default_history_max_messages(),
            template_path: None,
            waveform_dir: default_waveform_dir(),
        }
    }
}

fn default_max_iterations() -> u32 {
    15
}

fn default_max_execution_secs() -> u64 {
    30
}

fn default_history_max_messages() -> usize {
    10
}

fn default_waveform_dir() -> String {
    "~/.benchpilot/bench".to_string()
}

/// One addressable instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// `host:port` of the raw SCPI socket
    pub address: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl InstrumentConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Power supply setting applied once the bench is connected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerOnStartup {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_power_channel")]
    pub channel: String,
    #[serde(default = "default_power_voltage")]
    pub voltage: f64,
    #[serde(default = "default_power_current")]
    pub current: f64,
    #[serde(default = "default_power_protect")]
    pub current_protect: f64,
    #[serde(default = "default_output_state")]
    pub output_state: String,
}

impl Default for PowerOnStartup {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: default_power_channel(),
            voltage: default_power_voltage(),
            current: default_power_current(),
            current_protect: default_power_protect(),
            output_state: default_output_state(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_power_channel() -> String {
    "CH1".to_string()
}

fn default_power_voltage() -> f64 {
    5.0
}

fn default_power_current() -> f64 {
    2.0
}

fn default_power_protect() -> f64 {
    2.3
}

fn default_output_state() -> String {
    "ON".to_string()
}

/// Bench instrument addresses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    #[serde(default = "default_oscilloscope")]
    pub oscilloscope: InstrumentConfig,
    #[serde(default = "default_signal_generator")]
    pub signal_generator: InstrumentConfig,
    #[serde(default = "default_power_supply")]
    pub power_supply: InstrumentConfig,
    #[serde(default)]
    pub power_on_startup: PowerOnStartup,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            oscilloscope: default_oscilloscope(),
            signal_generator: default_signal_generator(),
            power_supply: default_power_supply(),
            power_on_startup: PowerOnStartup::default(),
        }
    }
}

fn default_oscilloscope() -> InstrumentConfig {
    InstrumentConfig::new("192.168.1.10:5025")
}

fn default_signal_generator() -> InstrumentConfig {
    InstrumentConfig::new("192.168.1.11:5025")
}

fn default_power_supply() -> InstrumentConfig {
    InstrumentConfig::new("192.168.1.12:5025")
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub bench: BenchConfig,
}

impl Config {
    /// Load from the default location, then apply environment overrides
    pub async fn load() -> Result<Self> {
        let path = config_path();
        let mut config = Self::load_from(&path).await?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from specific location
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("◆ NO CONFIG AT {:?}, USING DEFAULTS", path);
            return Ok(Config::default());
        }

        debug!("◆ LOADING CONFIG FROM {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("◆ WRITING CONFIG TO {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Override the LLM section from `API_BASE`, `API_KEY` and `API_MODEL`.
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(base) = get(ENV_API_BASE) {
            debug!("◆ {} OVERRIDES llm.api_base", ENV_API_BASE);
            self.llm.api_base = Some(base);
        }
        if let Some(key) = get(ENV_API_KEY) {
            debug!("◆ {} OVERRIDES llm.api_key", ENV_API_KEY);
            self.llm.api_key = key;
        }
        if let Some(model) = get(ENV_API_MODEL) {
            debug!("◆ {} OVERRIDES llm.model", ENV_API_MODEL);
            self.llm.model = model;
        }
    }

    /// API key, if any is configured
    pub fn api_key(&self) -> Option<String> {
        if self.llm.api_key.is_empty() {
            None
        } else {
            Some(self.llm.api_key.clone())
        }
    }

    /// API key or a startup error
    pub fn require_api_key(&self) -> Result<String> {
        self.api_key().ok_or(ConfigError::MissingApiKey)
    }

    pub fn api_base(&self) -> Option<String> {
        self.llm.api_base.clone().filter(|b| !b.is_empty())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn model(&self) -> String {
        self.llm.model.clone()
    }

    /// Directory waveform dumps are written to
    pub fn waveform_dir(&self) -> PathBuf {
        expand_home(&self.agent.waveform_dir)
    }

    /// External agent prompt template, when configured
    pub fn template_path(&self) -> Option<PathBuf> {
        self.agent.template_path.as_deref().map(expand_home)
    }

    pub fn history_max_messages(&self) -> usize {
        self.agent.history_max_messages
    }
}

/// Initialize config file and bench workspace
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("◆ CONFIG ALREADY PRESENT AT {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("◆ CONFIG WRITTEN TO {:?}", config_path);
    }

    let workspace = workspace_path();
    tokio::fs::create_dir_all(&workspace).await?;
    tokio::fs::create_dir_all(logs_dir()).await?;
    info!("◆ BENCH WORKSPACE READY AT {:?}", workspace);

    Config::load().await
}
