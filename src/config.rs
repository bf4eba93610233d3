use crate::core::Codec;
use crate::remote::RemoteConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level cache settings, loadable from a YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Root directory for disk caches and hybrid snapshots
    pub cache_dir: PathBuf,
    /// Payload codec shared by the persistent backends
    pub codec: Codec,
    /// Remote store connection settings
    pub remote: RemoteConfig,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            codec: Codec::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl RecallConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: RecallConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults, with the remote host/port taken from the environment
    pub fn from_env() -> Self {
        Self {
            remote: RemoteConfig::from_env(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Compression;

    #[test]
    fn parses_a_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recall.yaml");
        fs::write(
            &path,
            concat!(
                "cache_dir: /var/cache/recall\n",
                "codec:\n",
                "  algorithm: zstd\n",
                "  min_payload_size: 512\n",
                "  zstd_level: 5\n",
                "remote:\n",
                "  host: cache.internal\n",
                "  port: 6380\n",
            ),
        )
        .unwrap();

        let config = RecallConfig::from_file(&path).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/recall"));
        assert_eq!(config.codec.algorithm, Compression::Zstd);
        assert_eq!(config.codec.zstd_level, 5);
        assert_eq!(config.remote.host, "cache.internal");
        assert_eq!(config.remote.port, 6380);
    }

    #[test]
    fn defaults_are_sensible() {
        let config = RecallConfig::default();
        assert_eq!(config.cache_dir, PathBuf::from("./cache"));
        assert_eq!(config.remote.port, 6379);
    }
}
