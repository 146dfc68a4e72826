//! Configuration management.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration for foreman.
#[derive(Debug, Clone)]
pub struct ForemanConfig {
    /// Path to the data directory.
    pub data_dir: PathBuf,
    /// Memory retrieval and decay settings.
    pub memory: MemoryConfig,
    /// Learning loop settings.
    pub learning: LearningConfig,
    /// Background scheduler settings.
    pub scheduler: SchedulerConfig,
    /// LLM provider configuration.
    pub llm: LlmConfig,
}

/// Memory retrieval and decay settings.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// How many memory records to prime a worker with.
    pub retrieval_limit: usize,
    /// Minimum relevance for primed records.
    pub min_relevance: f64,
    /// Age in days after which low-relevance records may be deleted.
    pub decay_cutoff_days: u32,
    /// Relevance below which old records are deleted.
    pub decay_min_relevance: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            retrieval_limit: 5,
            min_relevance: 0.6,
            decay_cutoff_days: 90,
            decay_min_relevance: 0.3,
        }
    }
}

/// Learning loop settings.
#[derive(Debug, Clone)]
pub struct LearningConfig {
    /// Workers with activity within this window get processed.
    pub activity_window_days: u32,
    /// How many historical feedback records feed insight generation.
    pub history_limit: usize,
    /// Maximum retries for background job invocations.
    pub max_retries: u32,
    /// Base delay for exponential backoff, milliseconds.
    pub retry_base_delay_ms: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            activity_window_days: 7,
            history_limit: 50,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
        }
    }
}

/// Background scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Seconds between learning cycles.
    pub cycle_interval_secs: u64,
    /// Seconds between decay sweeps.
    pub decay_interval_secs: u64,
    /// Seconds between usage-analytics aggregations.
    pub analytics_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 3_600,
            decay_interval_secs: 86_400,
            analytics_interval_secs: 21_600,
        }
    }
}

/// Available LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProviderKind {
    /// `OpenAI` GPT.
    #[default]
    OpenAi,
    /// Ollama (local).
    Ollama,
}

impl LlmProviderKind {
    /// Parses a provider string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "ollama" => Self::Ollama,
            _ => Self::OpenAi,
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Provider name: "openai" or "ollama".
    pub provider: LlmProviderKind,
    /// Model name.
    pub model: Option<String>,
    /// API key (falls back to the provider's environment variable).
    pub api_key: Option<String>,
    /// Base URL for the provider (for self-hosted deployments).
    pub base_url: Option<String>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Completion token budget.
    pub max_tokens: u32,
    /// Request timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Consecutive failures before the circuit opens.
    pub breaker_failure_threshold: Option<u32>,
    /// How long the circuit stays open, milliseconds.
    pub breaker_reset_ms: Option<u64>,
    /// Trial calls allowed while half-open.
    pub breaker_half_open_max_calls: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            model: None,
            api_key: None,
            base_url: None,
            temperature: 0.3,
            max_tokens: 1024,
            timeout_ms: None,
            connect_timeout_ms: None,
            breaker_failure_threshold: None,
            breaker_reset_ms: None,
            breaker_half_open_max_calls: None,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Memory section.
    pub memory: Option<ConfigFileMemory>,
    /// Learning section.
    pub learning: Option<ConfigFileLearning>,
    /// Scheduler section.
    pub scheduler: Option<ConfigFileScheduler>,
    /// LLM section.
    pub llm: Option<ConfigFileLlm>,
}

/// Memory section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileMemory {
    /// Retrieval limit.
    pub retrieval_limit: Option<usize>,
    /// Minimum relevance for priming.
    pub min_relevance: Option<f64>,
    /// Decay cutoff age in days.
    pub decay_cutoff_days: Option<u32>,
    /// Decay deletion relevance threshold.
    pub decay_min_relevance: Option<f64>,
}

/// Learning section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLearning {
    /// Activity window in days.
    pub activity_window_days: Option<u32>,
    /// Historical feedback limit for insights.
    pub history_limit: Option<usize>,
    /// Max retries for background jobs.
    pub max_retries: Option<u32>,
    /// Retry backoff base delay, milliseconds.
    pub retry_base_delay_ms: Option<u64>,
}

/// Scheduler section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileScheduler {
    /// Learning cycle interval, seconds.
    pub cycle_interval_secs: Option<u64>,
    /// Decay sweep interval, seconds.
    pub decay_interval_secs: Option<u64>,
    /// Analytics interval, seconds.
    pub analytics_interval_secs: Option<u64>,
}

/// LLM section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLlm {
    /// Provider name.
    pub provider: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Base URL.
    pub base_url: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Completion token budget.
    pub max_tokens: Option<u32>,
    /// Request timeout, milliseconds.
    pub timeout_ms: Option<u64>,
    /// Connect timeout, milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Breaker failure threshold.
    pub breaker_failure_threshold: Option<u32>,
    /// Breaker reset timeout, milliseconds.
    pub breaker_reset_ms: Option<u64>,
    /// Breaker half-open trial calls.
    pub breaker_half_open_max_calls: Option<u32>,
}

impl Default for ForemanConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".foreman"),
            memory: MemoryConfig::default(),
            learning: LearningConfig::default(),
            scheduler: SchedulerConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl ForemanConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file, then applies env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            crate::Error::OperationFailed {
                operation: "read_config".to_string(),
                cause: format!("{}: {e}", path.as_ref().display()),
            }
        })?;
        let file: ConfigFile = toml::from_str(&content)
            .map_err(|e| crate::Error::InvalidInput(format!("config parse error: {e}")))?;
        Ok(Self::from_file(file).with_env_overrides())
    }

    /// Loads configuration from the default locations.
    ///
    /// Tries `foreman.toml` in the working directory, then the platform
    /// config directory; missing files fall back to defaults. Env
    /// overrides always apply.
    #[must_use]
    pub fn load_default() -> Self {
        let mut candidates = vec![PathBuf::from("foreman.toml")];
        if let Some(dirs) = directories::ProjectDirs::from("", "", "foreman") {
            candidates.push(dirs.config_dir().join("foreman.toml"));
        }

        for path in candidates {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Ignoring bad config file");
                    },
                }
            }
        }
        Self::default().with_env_overrides()
    }

    /// Builds a config from a parsed file, with defaults for gaps.
    #[must_use]
    pub fn from_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(memory) = file.memory {
            if let Some(v) = memory.retrieval_limit {
                config.memory.retrieval_limit = v;
            }
            if let Some(v) = memory.min_relevance {
                config.memory.min_relevance = v.clamp(0.0, 1.0);
            }
            if let Some(v) = memory.decay_cutoff_days {
                config.memory.decay_cutoff_days = v;
            }
            if let Some(v) = memory.decay_min_relevance {
                config.memory.decay_min_relevance = v.clamp(0.0, 1.0);
            }
        }
        if let Some(learning) = file.learning {
            if let Some(v) = learning.activity_window_days {
                config.learning.activity_window_days = v;
            }
            if let Some(v) = learning.history_limit {
                config.learning.history_limit = v;
            }
            if let Some(v) = learning.max_retries {
                config.learning.max_retries = v;
            }
            if let Some(v) = learning.retry_base_delay_ms {
                config.learning.retry_base_delay_ms = v;
            }
        }
        if let Some(scheduler) = file.scheduler {
            if let Some(v) = scheduler.cycle_interval_secs {
                config.scheduler.cycle_interval_secs = v.max(1);
            }
            if let Some(v) = scheduler.decay_interval_secs {
                config.scheduler.decay_interval_secs = v.max(1);
            }
            if let Some(v) = scheduler.analytics_interval_secs {
                config.scheduler.analytics_interval_secs = v.max(1);
            }
        }
        if let Some(llm) = file.llm {
            if let Some(ref provider) = llm.provider {
                config.llm.provider = LlmProviderKind::parse(provider);
            }
            config.llm.model = llm.model;
            config.llm.api_key = llm.api_key;
            config.llm.base_url = llm.base_url;
            if let Some(v) = llm.temperature {
                config.llm.temperature = v;
            }
            if let Some(v) = llm.max_tokens {
                config.llm.max_tokens = v;
            }
            config.llm.timeout_ms = llm.timeout_ms;
            config.llm.connect_timeout_ms = llm.connect_timeout_ms;
            config.llm.breaker_failure_threshold = llm.breaker_failure_threshold;
            config.llm.breaker_reset_ms = llm.breaker_reset_ms;
            config.llm.breaker_half_open_max_calls = llm.breaker_half_open_max_calls;
        }

        config
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("FOREMAN_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("FOREMAN_LLM_PROVIDER") {
            self.llm.provider = LlmProviderKind::parse(&v);
        }
        if let Ok(v) = std::env::var("FOREMAN_LLM_MODEL") {
            self.llm.model = Some(v);
        }
        if let Some(v) = std::env::var("FOREMAN_RETRIEVAL_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            self.memory.retrieval_limit = v;
        }
        if let Some(v) = std::env::var("FOREMAN_MIN_RELEVANCE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
        {
            self.memory.min_relevance = v.clamp(0.0, 1.0);
        }
        self
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Returns the path of the `SQLite` database file.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("foreman.db")
    }
}
