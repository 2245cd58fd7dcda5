//! Configuration of the state sync.
//!
//! [`Config`] is read from and written to TOML files. Every field has a default, so a file only
//! needs to contain the values that differ from them.

#![doc(issue_tracker_base_url = "https://github.com/hayekchain/hyk-sync/issues/")]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use hyk_net_fetch::{PeerScoringConfig, RetrieveConfig};
use hyk_trie_sync::SkipFilterConfig;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Default number of concurrent request workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Default maximum number of items per request.
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Default pause after a batch failed on every attempt.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Default number of consecutive failed batches after which the sync gives up.
pub const DEFAULT_MAX_STALLED_ROUNDS: usize = 8;

/// Errors reading or writing a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read, written or parsed.
    #[error("failed to access config at {path}: {source}")]
    Confy {
        /// Path of the file.
        path: String,
        /// The underlying error.
        source: confy::ConfyError,
    },
}

/// Configuration for the state sync node.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct Config {
    /// State sync configuration.
    pub state_sync: StateSyncConfig,
}

impl Config {
    /// Loads the configuration from a TOML file. A missing file is created with the defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        confy::load_path(path)
            .map_err(|source| ConfigError::Confy { path: path.display().to_string(), source })
    }

    /// Writes the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        confy::store_path(path, self)
            .map_err(|source| ConfigError::Confy { path: path.display().to_string(), source })
    }
}

/// Configuration of the state sync engine.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct StateSyncConfig {
    /// Number of requests in flight at the same time.
    pub workers: usize,
    /// Maximum number of items per request.
    pub batch_size: usize,
    /// Pause of a worker after its batch failed on every attempt.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
    /// Number of consecutive failed batches, without any successful response in between,
    /// after which the sync gives up.
    pub max_stalled_rounds: usize,
    /// Request timeouts and retries.
    pub retrieve: RetrieveConfig,
    /// Peer scoring.
    pub peers: PeerScoringConfig,
    /// Sizing of the skip filter.
    pub skip_filter: SkipFilterConfig,
}

impl Default for StateSyncConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_stalled_rounds: DEFAULT_MAX_STALLED_ROUNDS,
            retrieve: RetrieveConfig::default(),
            peers: PeerScoringConfig::default(),
            skip_filter: SkipFilterConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENSION: &str = "toml";

    fn with_tempdir(filename: &str, proc: fn(&Path)) {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join(filename).with_extension(EXTENSION);

        proc(&config_path);

        temp_dir.close().unwrap()
    }

    #[test]
    fn test_store_load_config() {
        with_tempdir("config-store-test", |config_path| {
            let mut config = Config::default();
            config.state_sync.workers = 16;
            config.state_sync.retrieve.min_timeout = Duration::from_millis(1500);
            config.save(config_path).unwrap();

            let loaded = Config::from_path(config_path).unwrap();
            assert_eq!(config, loaded);
        })
    }

    #[test]
    fn test_missing_file_is_created() {
        with_tempdir("config-missing-test", |config_path| {
            assert_eq!(Config::from_path(config_path).unwrap(), Config::default());
            assert!(config_path.exists());
        })
    }

    #[test]
    fn test_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [state_sync]
            workers = 8
            retry_backoff = "250ms"

            [state_sync.retrieve]
            max_retries = 5
            min_timeout = "2s"

            [state_sync.peers.reputation_weights]
            timeout = -1

            [state_sync.skip_filter]
            bits = 1024
            "#,
        )
        .unwrap();

        let state_sync = config.state_sync;
        assert_eq!(state_sync.workers, 8);
        assert_eq!(state_sync.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(state_sync.retry_backoff, Duration::from_millis(250));
        assert_eq!(state_sync.retrieve.max_retries, 5);
        assert_eq!(state_sync.retrieve.min_timeout, Duration::from_secs(2));
        assert_eq!(state_sync.retrieve.max_timeout, RetrieveConfig::default().max_timeout);
        assert_eq!(state_sync.peers.reputation_weights.timeout, -1);
        assert_eq!(
            state_sync.peers.reputation_weights.bad_data,
            PeerScoringConfig::default().reputation_weights.bad_data
        );
        assert_eq!(state_sync.skip_filter.bits, 1024);
        assert_eq!(state_sync.skip_filter.hashes, SkipFilterConfig::default().hashes);
    }

    #[test]
    fn test_invalid_config() {
        with_tempdir("config-invalid-test", |config_path| {
            std::fs::write(config_path, "[state_sync]\nworkers = \"many\"\n").unwrap();
            assert!(matches!(Config::from_path(config_path), Err(ConfigError::Confy { .. })));
        })
    }
}
