//! Application configuration for DepoIndex.
//!
//! User config lives at `~/.depoindex/depoindex.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DepoIndexError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "depoindex.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".depoindex";

// ---------------------------------------------------------------------------
// Config structs (matching depoindex.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Gemini API settings.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default run output directory.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Default number of topic clusters.
    #[serde(default = "default_num_topics")]
    pub num_topics: usize,

    /// Default lines per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Minimum recommended transcript length in words.
    #[serde(default = "default_min_words")]
    pub min_words: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            num_topics: default_num_topics(),
            chunk_size: default_chunk_size(),
            min_words: default_min_words(),
        }
    }
}

fn default_output_dir() -> String {
    "~/depoindex-runs".into()
}
fn default_num_topics() -> usize {
    5
}
fn default_chunk_size() -> usize {
    3
}
fn default_min_words() -> usize {
    100
}

/// `[gemini]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for topic generation and TOC tasks.
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for semantic clustering (larger context).
    #[serde(default = "default_clustering_model")]
    pub clustering_model: String,

    /// Minimum ms between API calls.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Sampling temperature for topic generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            clustering_model: default_clustering_model(),
            rate_limit_ms: default_rate_limit(),
            temperature: default_temperature(),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_clustering_model() -> String {
    "gemini-1.5-pro".into()
}
fn default_rate_limit() -> u64 {
    1500
}
fn default_temperature() -> f32 {
    0.3
}

/// `[embedding]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: "gemini" (remote API) or "hash" (deterministic local).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Remote embedding model id.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimensionality (both providers produce this).
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
        }
    }
}

fn default_embedding_provider() -> String {
    "gemini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-004".into()
}
fn default_embedding_dimension() -> usize {
    384
}

// ---------------------------------------------------------------------------
// Analyze options (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime analysis options — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Number of topic clusters to build.
    pub num_topics: usize,
    /// Lines per chunk.
    pub chunk_size: usize,
    /// Minimum recommended transcript length in words.
    pub min_words: usize,
    /// Whether to call the Gemini API for enrichment.
    pub use_llm: bool,
}

impl From<&AppConfig> for AnalyzeOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            num_topics: config.defaults.num_topics,
            chunk_size: config.defaults.chunk_size,
            min_words: config.defaults.min_words,
            use_llm: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.depoindex/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DepoIndexError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.depoindex/depoindex.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DepoIndexError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DepoIndexError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DepoIndexError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DepoIndexError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DepoIndexError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the Gemini API key from the configured env var, if set and non-empty.
pub fn gemini_api_key(config: &AppConfig) -> Option<String> {
    std::env::var(&config.gemini.api_key_env)
        .ok()
        .filter(|v| !v.is_empty())
}

/// Check that the Gemini API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    match gemini_api_key(config) {
        Some(_) => Ok(()),
        None => Err(DepoIndexError::config(format!(
            "Gemini API key not found. Set the {} environment variable.\n\
             Get a key at https://aistudio.google.com/apikey",
            config.gemini.api_key_env
        ))),
    }
}

/// Expand a leading `~` in a configured path to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.num_topics, 5);
        assert_eq!(parsed.gemini.api_key_env, "GEMINI_API_KEY");
        assert_eq!(parsed.gemini.rate_limit_ms, 1500);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
output_dir = "/tmp/runs"
num_topics = 8

[gemini]
model = "gemini-2.0-flash"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.output_dir, "/tmp/runs");
        assert_eq!(config.defaults.num_topics, 8);
        assert_eq!(config.defaults.chunk_size, 3);
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.gemini.clustering_model, "gemini-1.5-pro");
        assert_eq!(config.embedding.dimension, 384);
    }

    #[test]
    fn analyze_options_from_app_config() {
        let app = AppConfig::default();
        let opts = AnalyzeOptions::from(&app);
        assert_eq!(opts.num_topics, 5);
        assert_eq!(opts.chunk_size, 3);
        assert_eq!(opts.min_words, 100);
        assert!(opts.use_llm);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.gemini.api_key_env = "DI_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn expand_home_passthrough() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("rel/path"), PathBuf::from("rel/path"));
    }
}
