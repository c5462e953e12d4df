//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Engine Configuration Constants
// ============================================================================

/// Default SQLite database path for migration state.
pub const DEFAULT_DATABASE_PATH: &str = "airlift.db";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default page size for paged relation extraction.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default timeout for paged source requests in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default timeout for archive downloads in seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 600;

/// Default cap on downloaded archive size (5 GiB).
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Default cap on decompressed archive size (10 GiB).
pub const DEFAULT_MAX_DECOMPRESSED_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// Default destination directory for migrated binary files.
pub const DEFAULT_FILES_ROOT: &str = "./airlift-files";

/// Default dedupe ledger entry lifetime in hours.
pub const DEFAULT_CACHE_TTL_HOURS: i64 = 24;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    pub transfer: TransferConfig,
    pub destination: DestinationConfig,
    pub cache: CacheConfig,
}

/// Migration state database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

/// Source installation access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the source's migration API (e.g. "https://src.example.com/api")
    pub base_url: String,
    /// Bearer token for the source API
    pub token: Option<String>,
    pub page_size: u32,
    pub request_timeout_secs: u64,
    pub download_timeout_secs: u64,
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// File transfer bounds and scratch placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Parent directory for per-run scratch directories
    pub scratch_root: PathBuf,
    pub max_download_bytes: u64,
    pub max_decompressed_bytes: u64,
}

/// Destination storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Directory migrated binary payloads are copied under
    pub files_root: PathBuf,
}

/// Dedupe ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_hours: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                path: DEFAULT_DATABASE_PATH.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            },
            source: SourceConfig {
                base_url: String::new(),
                token: None,
                page_size: DEFAULT_PAGE_SIZE,
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
                download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            },
            transfer: TransferConfig {
                scratch_root: std::env::temp_dir(),
                max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
                max_decompressed_bytes: DEFAULT_MAX_DECOMPRESSED_BYTES,
            },
            destination: DestinationConfig {
                files_root: PathBuf::from(DEFAULT_FILES_ROOT),
            },
            cache: CacheConfig {
                ttl_hours: DEFAULT_CACHE_TTL_HOURS,
            },
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(path) = std::env::var("AIRLIFT_DATABASE_PATH") {
            config.database.path = path;
        }
        config.database.max_connections = std::env::var("AIRLIFT_DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS);

        if let Ok(url) = std::env::var("AIRLIFT_SOURCE_URL") {
            config.source.base_url = url;
        }
        config.source.token = std::env::var("AIRLIFT_SOURCE_TOKEN").ok();
        config.source.page_size = std::env::var("AIRLIFT_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);
        config.source.request_timeout_secs = std::env::var("AIRLIFT_REQUEST_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        config.source.download_timeout_secs = std::env::var("AIRLIFT_DOWNLOAD_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS);

        if let Ok(root) = std::env::var("AIRLIFT_SCRATCH_ROOT") {
            config.transfer.scratch_root = PathBuf::from(root);
        }
        config.transfer.max_download_bytes = std::env::var("AIRLIFT_MAX_DOWNLOAD_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_DOWNLOAD_BYTES);
        config.transfer.max_decompressed_bytes = std::env::var("AIRLIFT_MAX_DECOMPRESSED_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_DECOMPRESSED_BYTES);

        if let Ok(root) = std::env::var("AIRLIFT_FILES_ROOT") {
            config.destination.files_root = PathBuf::from(root);
        }

        config.cache.ttl_hours = std::env::var("AIRLIFT_CACHE_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CACHE_TTL_HOURS);

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.path.is_empty() {
            anyhow::bail!("Database path cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max connections must be greater than 0");
        }
        if self.source.page_size == 0 {
            anyhow::bail!("Page size must be greater than 0");
        }
        if self.transfer.max_download_bytes == 0 {
            anyhow::bail!("Max download bytes must be greater than 0");
        }
        if self.transfer.max_decompressed_bytes == 0 {
            anyhow::bail!("Max decompressed bytes must be greater than 0");
        }
        if self.cache.ttl_hours <= 0 {
            anyhow::bail!("Cache TTL must be greater than 0 hours");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "AIRLIFT_DATABASE_PATH",
            "AIRLIFT_DATABASE_MAX_CONNECTIONS",
            "AIRLIFT_SOURCE_URL",
            "AIRLIFT_SOURCE_TOKEN",
            "AIRLIFT_PAGE_SIZE",
            "AIRLIFT_REQUEST_TIMEOUT",
            "AIRLIFT_DOWNLOAD_TIMEOUT",
            "AIRLIFT_SCRATCH_ROOT",
            "AIRLIFT_MAX_DOWNLOAD_BYTES",
            "AIRLIFT_MAX_DECOMPRESSED_BYTES",
            "AIRLIFT_FILES_ROOT",
            "AIRLIFT_CACHE_TTL_HOURS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = EngineConfig::load().unwrap();
        assert_eq!(config.database.path, DEFAULT_DATABASE_PATH);
        assert_eq!(config.source.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.transfer.max_download_bytes, DEFAULT_MAX_DOWNLOAD_BYTES);
        assert_eq!(config.cache.ttl_hours, DEFAULT_CACHE_TTL_HOURS);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("AIRLIFT_SOURCE_URL", "https://src.example.com/api");
        std::env::set_var("AIRLIFT_PAGE_SIZE", "25");
        std::env::set_var("AIRLIFT_CACHE_TTL_HOURS", "6");

        let config = EngineConfig::load().unwrap();
        assert_eq!(config.source.base_url, "https://src.example.com/api");
        assert_eq!(config.source.page_size, 25);
        assert_eq!(config.cache.ttl_hours, 6);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_rejected() {
        clear_env();

        let mut config = EngineConfig::default();
        config.source.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.cache.ttl_hours = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.transfer.max_decompressed_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_unparseable_env_falls_back_to_default() {
        clear_env();
        std::env::set_var("AIRLIFT_PAGE_SIZE", "not-a-number");
        let config = EngineConfig::load().unwrap();
        assert_eq!(config.source.page_size, DEFAULT_PAGE_SIZE);
        clear_env();
    }
}
