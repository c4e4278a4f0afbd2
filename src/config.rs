//! Engine configuration from environment variables
//!
//! All knobs live here so the pipeline itself never touches `std::env`.

use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model identifier passed through to the generator
    pub default_model: String,

    /// Base URL of the OpenAI-compatible chat endpoint
    pub llm_base_url: String,

    /// API key for the generator (empty for local servers)
    pub llm_api_key: String,

    /// Postgres connection string; queries are not executed when absent
    pub database_url: Option<String>,

    /// Directory of per-table descriptor JSON files
    pub catalog_dir: PathBuf,

    /// Row limit applied by the query executor
    pub max_rows: usize,

    /// Serialized-size budget for result sets, in characters
    pub char_limit: usize,

    /// Deadline applied to each generator / database call
    pub call_timeout: Duration,
}

impl EngineConfig {
    /// Read configuration from the environment (after `dotenv` has run).
    pub fn from_env() -> Self {
        let timeout_secs = std::env::var("CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Self {
            default_model: std::env::var("DEFAULT_MODEL")
                .unwrap_or_else(|_| "llama3.2:latest".to_string()),
            llm_base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434/v1".to_string()),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
            database_url: std::env::var("DATABASE_URL").ok(),
            catalog_dir: std::env::var("CATALOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("table_data")),
            max_rows: 10,
            char_limit: 12_000,
            call_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_model: "llama3.2:latest".to_string(),
            llm_base_url: "http://localhost:11434/v1".to_string(),
            llm_api_key: String::new(),
            database_url: None,
            catalog_dir: PathBuf::from("table_data"),
            max_rows: 10,
            char_limit: 12_000,
            call_timeout: Duration::from_secs(30),
        }
    }
}
