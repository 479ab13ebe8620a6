use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid ignore pattern '{pattern}': {source}")]
    IgnorePattern {
        pattern: String,
        source: regex::Error,
    },
}

/// Top-level configuration loaded from .pr-reviewer.toml.
///
/// All fields are optional — the tool works with zero config plus the
/// GITHUB_TOKEN and provider API key environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub review: ReviewConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewConfig {
    /// Model backend: "openai" or "anthropic".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier passed to the backend.
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum chunk payload size in bytes.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,

    /// Files at or below this many lines ship whole as context.
    #[serde(default = "default_small_file_threshold")]
    pub small_file_threshold: usize,

    /// Context lines on each side of the touched ranges.
    #[serde(default = "default_context_radius")]
    pub context_radius: usize,

    /// Regex patterns for files to skip entirely (lockfiles, vendored
    /// code, generated output).
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Short free-text description of the repository, included in every
    /// prompt when set.
    pub repo_context: Option<String>,

    /// Additional attempts after a transient provider failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between retry attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Chunks reviewed in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_chunk_bytes() -> usize {
    60_000
}

fn default_small_file_threshold() -> usize {
    300
}

fn default_context_radius() -> usize {
    150
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_concurrency() -> usize {
    3
}

impl Default for ReviewConfig {
    fn default() -> Self {
        ReviewConfig {
            provider: default_provider(),
            model: default_model(),
            max_chunk_bytes: default_max_chunk_bytes(),
            small_file_threshold: default_small_file_threshold(),
            context_radius: default_context_radius(),
            ignore_patterns: Vec::new(),
            repo_context: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    /// OpenAI API key. Falls back to OPENAI_API_KEY env var.
    pub openai_api_key: Option<String>,
    /// Anthropic API key. Falls back to ANTHROPIC_API_KEY env var.
    pub anthropic_api_key: Option<String>,
}

impl Config {
    /// Load configuration from .pr-reviewer.toml in the current directory,
    /// or defaults if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(".pr-reviewer.toml");
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
    }

    pub fn openai_api_key(&self) -> Option<String> {
        self.providers
            .openai_api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    pub fn anthropic_api_key(&self) -> Option<String> {
        self.providers
            .anthropic_api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
    }

    /// Compile the configured ignore patterns, rejecting invalid regexes
    /// up front rather than mid-run.
    pub fn ignore_regexes(&self) -> Result<Vec<regex::Regex>, ConfigError> {
        self.review
            .ignore_patterns
            .iter()
            .map(|pattern| {
                regex::Regex::new(pattern).map_err(|source| ConfigError::IgnorePattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect()
    }
}
