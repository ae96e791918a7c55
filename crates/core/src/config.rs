//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum size of a single chunk payload in bytes.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Maximum number of chunks a single file may declare.
    #[serde(default = "default_max_total_chunks")]
    pub max_total_chunks: u32,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_chunk_size() -> u64 {
    crate::DEFAULT_MAX_CHUNK_SIZE
}

fn default_max_total_chunks() -> u32 {
    crate::DEFAULT_MAX_TOTAL_CHUNKS
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_chunk_size: default_max_chunk_size(),
            max_total_chunks: default_max_total_chunks(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_size == 0 {
            return Err("server.max_chunk_size must be greater than 0".to_string());
        }
        if usize::try_from(self.max_chunk_size).is_err() {
            return Err(format!(
                "server.max_chunk_size {} exceeds the platform address space",
                self.max_chunk_size
            ));
        }
        if self.max_total_chunks == 0 {
            return Err("server.max_total_chunks must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Storage layout: two distinct local directories.
///
/// The chunk area holds temporary per-chunk artifacts, the output area holds
/// assembled files. Cleanup of one area must never touch the other, so the
/// two roots may be neither identical nor nested.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for temporary chunk artifacts.
    #[serde(default = "default_chunk_dir")]
    pub chunk_dir: PathBuf,
    /// Root directory for assembled files.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_chunk_dir() -> PathBuf {
    PathBuf::from("./data/chunks")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunk_dir: default_chunk_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants (lexical check only; the
    /// storage crate re-checks canonical paths once the directories exist).
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_dir.as_os_str().is_empty() || self.output_dir.as_os_str().is_empty() {
            return Err("storage.chunk_dir and storage.output_dir must be set".to_string());
        }
        if paths_overlap(&self.chunk_dir, &self.output_dir) {
            return Err(format!(
                "storage.chunk_dir ({}) and storage.output_dir ({}) must be distinct, non-nested directories",
                self.chunk_dir.display(),
                self.output_dir.display()
            ));
        }
        Ok(())
    }
}

/// True when one path is equal to or contained in the other.
pub fn paths_overlap(a: &Path, b: &Path) -> bool {
    let normalize = |p: &Path| -> PathBuf {
        p.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    };
    let (a, b) = (normalize(a), normalize(b));
    a.starts_with(&b) || b.starts_with(&a)
}

/// Age-based eviction of abandoned upload sessions and orphaned chunks.
///
/// Disabled by default: sessions then live until they complete.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Enable the background reaper (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Idle time after which a session and its chunks are discarded.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Interval between reaper runs.
    #[serde(default = "default_reaper_interval_secs")]
    pub interval_secs: u64,
}

fn default_session_ttl_secs() -> u64 {
    86400 // 24 hours
}

fn default_reaper_interval_secs() -> u64 {
    300
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            session_ttl_secs: default_session_ttl_secs(),
            interval_secs: default_reaper_interval_secs(),
        }
    }
}

impl ReaperConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }

        // tokio::time::interval panics on a zero period
        if self.interval_secs == 0 {
            return Err("reaper.interval_secs cannot be 0 when the reaper is enabled".to_string());
        }

        if self.session_ttl_secs == 0 {
            return Err(
                "reaper.session_ttl_secs cannot be 0 when the reaper is enabled".to_string(),
            );
        }

        if self.session_ttl_secs > i64::MAX as u64 {
            return Err(format!(
                "reaper.session_ttl_secs {} exceeds maximum value {}",
                self.session_ttl_secs,
                i64::MAX
            ));
        }

        Ok(())
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
}

impl AppConfig {
    /// Create a configuration rooted in `dir`, for tests.
    pub fn for_testing(dir: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig {
                chunk_dir: dir.join("chunks"),
                output_dir: dir.join("uploads"),
            },
            reaper: ReaperConfig::default(),
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.reaper.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.reaper.enabled);
        assert_eq!(config.server.max_chunk_size, crate::DEFAULT_MAX_CHUNK_SIZE);
    }

    #[test]
    fn test_storage_rejects_same_directory() {
        let config = StorageConfig {
            chunk_dir: PathBuf::from("./data"),
            output_dir: PathBuf::from("data"),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_rejects_nested_directories() {
        let config = StorageConfig {
            chunk_dir: PathBuf::from("./uploads/temp"),
            output_dir: PathBuf::from("./uploads"),
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("non-nested"));
    }

    #[test]
    fn test_storage_allows_siblings_with_common_prefix() {
        let config = StorageConfig {
            chunk_dir: PathBuf::from("/srv/uploads-chunks"),
            output_dir: PathBuf::from("/srv/uploads"),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reaper_validation_only_when_enabled() {
        let mut reaper = ReaperConfig {
            enabled: false,
            session_ttl_secs: 0,
            interval_secs: 0,
        };
        assert!(reaper.validate().is_ok());

        reaper.enabled = true;
        assert!(reaper.validate().is_err());

        reaper.interval_secs = 60;
        assert!(reaper.validate().is_err());

        reaper.session_ttl_secs = 3600;
        assert!(reaper.validate().is_ok());
    }

    #[test]
    fn test_server_rejects_zero_limits() {
        let server = ServerConfig {
            max_chunk_size: 0,
            ..Default::default()
        };
        assert!(server.validate().is_err());

        let server = ServerConfig {
            max_total_chunks: 0,
            ..Default::default()
        };
        assert!(server.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [storage]
            chunk_dir = "/var/lib/chunkyard/chunks"

            [reaper]
            enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(
            config.storage.chunk_dir,
            PathBuf::from("/var/lib/chunkyard/chunks")
        );
        assert_eq!(config.storage.output_dir, PathBuf::from("./data/uploads"));
        assert!(config.reaper.enabled);
        assert_eq!(config.reaper.session_ttl(), Duration::from_secs(86400));
        assert!(config.validate().is_ok());
    }
}
