//! Configuration for the ledger service

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Log output: "text" or "json"
    pub log_format: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Ledger engine configuration
    pub engine: EngineConfig,

    /// Terminal sync configuration
    pub sync: SyncConfig,

    /// Projection cache configuration
    pub cache: CacheConfig,

    /// Consistency audit configuration
    pub audit: AuditConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/brewtab"),
            service_name: "brewtab".to_string(),
            log_format: "text".to_string(),
            rocksdb: RocksDBConfig::default(),
            engine: EngineConfig::default(),
            sync: SyncConfig::default(),
            cache: CacheConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// fsync every write batch
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 32,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

/// Ledger engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for lock waits and storage calls (milliseconds)
    pub storage_timeout_ms: u64,

    /// Credit granted to new accounts when none is specified
    pub default_initial_credit: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_timeout_ms: 2_000,
            default_initial_credit: 500,
        }
    }
}

impl EngineConfig {
    /// Storage timeout as a duration
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

/// Terminal sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum transactions accepted in one offline batch
    pub max_batch_size: usize,

    /// Terminals not seen for this long are reported stale (seconds)
    pub terminal_stale_after_secs: u64,

    /// Terminals listed in the system status
    pub recent_terminals: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
            terminal_stale_after_secs: 15 * 60,
            recent_terminals: 10,
        }
    }
}

/// Projection cache backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process TTL map
    Memory,
    /// Shared Redis instance
    Redis,
    /// No cache; reads always go to the store
    Disabled,
}

/// Projection cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Backend selection
    pub backend: CacheBackend,

    /// Redis URL (backend = redis)
    pub redis_url: String,

    /// TTL of the active-account projection (seconds)
    pub accounts_ttl_secs: u64,

    /// TTL of the active-option projection (seconds)
    pub options_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            accounts_ttl_secs: 300,
            options_ttl_secs: 3600,
        }
    }
}

/// Consistency audit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Run the audit on a schedule
    pub enabled: bool,

    /// Daily run time, "HH:MM" UTC
    pub run_at: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_at: "03:00".to_string(),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load defaults, then apply environment overrides
    pub fn from_env() -> crate::Result<Self> {
        Config::default().with_env_overrides()
    }

    /// Apply environment variable overrides on top of `self`
    pub fn with_env_overrides(mut self) -> crate::Result<Self> {
        if let Ok(data_dir) = std::env::var("BREWTAB_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(backend) = std::env::var("BREWTAB_CACHE_BACKEND") {
            self.cache.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => CacheBackend::Memory,
                "redis" => CacheBackend::Redis,
                "disabled" | "none" => CacheBackend::Disabled,
                other => {
                    return Err(crate::Error::Config(format!(
                        "Unknown cache backend '{}'",
                        other
                    )))
                }
            };
        }

        if let Ok(url) = std::env::var("BREWTAB_REDIS_URL") {
            self.cache.redis_url = url;
        }

        if let Ok(run_at) = std::env::var("BREWTAB_AUDIT_AT") {
            self.audit.run_at = run_at;
        }

        if let Ok(format) = std::env::var("BREWTAB_LOG_FORMAT") {
            self.log_format = format;
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "brewtab");
        assert_eq!(config.engine.default_initial_credit, 500);
        assert_eq!(config.cache.accounts_ttl_secs, 300);
        assert_eq!(config.cache.options_ttl_secs, 3600);
        assert_eq!(config.audit.run_at, "03:00");
        assert!(config.audit.enabled);
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            data_dir = "/var/lib/brewtab"

            [cache]
            backend = "disabled"

            [audit]
            run_at = "04:30"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/brewtab"));
        assert_eq!(config.cache.backend, CacheBackend::Disabled);
        assert_eq!(config.cache.options_ttl_secs, 3600);
        assert_eq!(config.audit.run_at, "04:30");
        assert_eq!(config.sync.max_batch_size, 500);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("brewtab.toml");
        std::fs::write(&path, "service_name = \"kiosk\"\n[engine]\nstorage_timeout_ms = 250\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.service_name, "kiosk");
        assert_eq!(config.engine.storage_timeout(), Duration::from_millis(250));
    }
}
