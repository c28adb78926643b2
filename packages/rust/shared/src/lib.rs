//! Shared types, error model, and configuration for DepoIndex.
//!
//! This crate is the foundation depended on by all other DepoIndex crates.
//! It provides:
//! - [`DepoIndexError`] — the unified error type
//! - Domain types ([`AnalysisManifest`], [`Topic`], [`TopicCluster`], [`Toc`], [`RunId`])
//! - Configuration ([`AppConfig`], [`AnalyzeOptions`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AnalyzeOptions, AppConfig, DefaultsConfig, EmbeddingConfig, GeminiConfig, config_dir,
    config_file_path, expand_home, gemini_api_key, init_config, load_config, load_config_from,
    validate_api_key,
};
pub use error::{DepoIndexError, Result};
pub use types::{
    AnalysisManifest, CURRENT_SCHEMA_VERSION, RunId, Toc, TocEntry, TokenUsage, Topic,
    TopicCluster,
};
