use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MaestroError, Result};

/// Top-level Maestro configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Engine-wide execution defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline applied to nodes that do not declare `timeoutMs`.
    #[serde(default = "default_node_timeout_ms")]
    pub default_node_timeout_ms: u64,
    /// Deadline applied to workflows that do not declare `timeoutMs`.
    #[serde(default)]
    pub default_workflow_timeout_ms: Option<u64>,
    /// Finished executions kept in memory for lookup. Older ones are only
    /// reachable through the store, and only if their workflow checkpoints.
    #[serde(default = "default_retained_executions")]
    pub retained_executions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_node_timeout_ms: default_node_timeout_ms(),
            default_workflow_timeout_ms: None,
            retained_executions: default_retained_executions(),
        }
    }
}

fn default_node_timeout_ms() -> u64 { 300_000 }
fn default_retained_executions() -> usize { 100 }

/// Retry configuration for workflows running with `errorHandling = "retry"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Used for nodes that declare `maxRetries = 0`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 200 }
fn default_max_backoff() -> u64 { 5000 }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Where workflow definitions and execution records live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// SQLite database file. Supports `~/`.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String { "maestro.db".to_string() }

impl StoreConfig {
    /// Resolve the database path (expand ~).
    pub fn resolved_path(&self) -> PathBuf {
        expand_home(&self.path)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// tracing-subscriber filter directive. `RUST_LOG` wins when set.
    #[serde(default)]
    pub filter: Option<String>,
    /// Directory for per-execution JSONL run logs.
    #[serde(default)]
    pub run_log_dir: Option<String>,
}

impl LogConfig {
    pub fn run_log_path(&self) -> Option<PathBuf> {
        self.run_log_dir.as_deref().map(expand_home)
    }
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| MaestroError::ConfigNotFound(path.display().to_string()))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        toml::from_str(&expanded).map_err(|e| MaestroError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_MAESTRO_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_MAESTRO_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_MAESTRO_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_MAESTRO_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_MAESTRO_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.engine.default_node_timeout_ms, 300_000);
        assert!(config.engine.default_workflow_timeout_ms.is_none());
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff_ms, 200);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.path, "maestro.db");
        assert!(config.log.filter.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = AppConfig::parse(
            r#"
[engine]
default_workflow_timeout_ms = 60000

[store]
backend = "sqlite"
"#,
        )
        .unwrap();
        assert_eq!(config.engine.default_node_timeout_ms, 300_000);
        assert_eq!(config.engine.default_workflow_timeout_ms, Some(60_000));
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.path, "maestro.db");
    }

    #[test]
    fn test_invalid_backend_is_config_error() {
        let err = AppConfig::parse("[store]\nbackend = \"postgres\"\n").unwrap_err();
        assert!(matches!(err, MaestroError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = AppConfig::load(Path::new("/nonexistent/maestro.toml")).unwrap_err();
        assert!(matches!(err, MaestroError::ConfigNotFound(_)));
    }
}
