// ============================================================================
// EngineConfig - Runtime configuration
// ============================================================================
// Defaults can be overridden through environment variables:
//   QUESTLINE_DB_PATH          ledger database file (default ~/.questline/ledger.redb)
//   QUESTLINE_CATALOG_PATH     JSON catalog (default: built-in catalog)
//   QUESTLINE_LOCK_TIMEOUT_MS  account lock acquisition timeout
//   QUESTLINE_MAX_RETRIES      attempts for transient failures
// ============================================================================

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::retry::RetryConfig;
use crate::types::{EngineError, Result};

/// Default account lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ledger database file; `None` resolves to ~/.questline/ledger.redb
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Catalog JSON file; `None` uses the built-in catalog
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            catalog_path: None,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with any QUESTLINE_* environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("QUESTLINE_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("QUESTLINE_CATALOG_PATH") {
            config.catalog_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = parse_env_u64("QUESTLINE_LOCK_TIMEOUT_MS") {
            config.lock_timeout_ms = ms;
        }
        if let Some(n) = parse_env_u64("QUESTLINE_MAX_RETRIES") {
            config.retry.max_attempts = n.clamp(1, u64::from(u32::MAX)) as u32;
        }

        config
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Resolve the database path, creating ~/.questline when defaulting
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }

        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Storage("Cannot determine home directory".into()))?;
        let dir = home.join(".questline");
        std::fs::create_dir_all(&dir).map_err(|e| {
            EngineError::Storage(format!("Failed to create .questline directory: {}", e))
        })?;
        Ok(dir.join("ledger.redb"))
    }
}

fn parse_env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={:?}: not an unsigned integer", key, raw);
            None
        }
    }
}
