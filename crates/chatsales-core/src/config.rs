use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Candidates or records sent to the inference service per call.
pub const DEFAULT_BATCH_SIZE: usize = 30;

/// Batches allowed in flight at once during extraction and repair.
pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 4;

/// Relative deviation allowed between `total_price` and `quantity × unit_price`.
pub const DEFAULT_ARITHMETIC_TOLERANCE: f64 = 0.05;

/// Prefix for environment overrides, e.g. `CHATSALES__INFERENCE__API_KEY`.
pub const ENV_PREFIX: &str = "CHATSALES";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env(ENV_PREFIX)
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(Self::environment(prefix))
            .build()?;

        Self::finish(config)
    }

    /// Load configuration from an optional file with environment overrides.
    /// A missing file is not an error; every setting has a default.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Self::environment(ENV_PREFIX))
            .build()?;

        Self::finish(config)
    }

    /// Parse configuration from TOML text, without environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        Self::finish(config)
    }

    fn environment(prefix: &str) -> Environment {
        Environment::with_prefix(prefix)
            .separator("__")
            .try_parsing(true)
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let app: AppConfig = config.try_deserialize()?;
        app.pipeline.validate()?;
        Ok(app)
    }
}

/// Inference service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    /// HTTP timeout of a single attempt. A whole stage call may take every
    /// attempt plus the backoff between them.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Sent as `reasoning_effort` when non-empty; keeps reasoning models
    /// from prefixing their JSON with thinking text.
    #[serde(default = "default_reasoning_effort")]
    pub reasoning_effort: String,
}

impl InferenceConfig {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = effort.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            reasoning_effort: default_reasoning_effort(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "qwen/qwen3-32b".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_reasoning_effort() -> String {
    "none".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> usize {
    3
}

/// Pipeline tuning. The only override point for the batch and tolerance constants.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    #[serde(default = "default_arithmetic_tolerance")]
    pub arithmetic_tolerance: f64,
    #[serde(default = "default_deep_audit")]
    pub deep_audit: bool,
}

impl PipelineConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_concurrent_batches(mut self, max: usize) -> Self {
        self.max_concurrent_batches = max;
        self
    }

    pub fn with_arithmetic_tolerance(mut self, tolerance: f64) -> Self {
        self.arithmetic_tolerance = tolerance;
        self
    }

    pub fn with_deep_audit(mut self, enabled: bool) -> Self {
        self.deep_audit = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Message(
                "pipeline.batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_batches == 0 {
            return Err(ConfigError::Message(
                "pipeline.max_concurrent_batches must be at least 1".to_string(),
            ));
        }
        if !self.arithmetic_tolerance.is_finite() || self.arithmetic_tolerance < 0.0 {
            return Err(ConfigError::Message(
                "pipeline.arithmetic_tolerance must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
            arithmetic_tolerance: DEFAULT_ARITHMETIC_TOLERANCE,
            deep_audit: true,
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_concurrent_batches() -> usize {
    DEFAULT_MAX_CONCURRENT_BATCHES
}

fn default_arithmetic_tolerance() -> f64 {
    DEFAULT_ARITHMETIC_TOLERANCE
}

fn default_deep_audit() -> bool {
    true
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
            cors_origins: default_cors_origins(),
        }
    }

    pub fn with_host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024 // 20MB
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
    ]
}
