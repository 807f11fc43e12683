//! Configuration management
//!
//! Loaded from a TOML file; any missing field takes its default, and a
//! missing file yields the default configuration.

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::consensus::MAX_DIFFICULTY_BITS;
use crate::crypto::CryptoSuite;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChainConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Leading zero bits required of every mined block
    #[serde(default = "default_difficulty_bits")]
    pub difficulty_bits: u32,
    /// `blake3` or `sha256`
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,
    #[serde(default)]
    pub mining: MiningConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MiningConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_nonce")]
    pub max_nonce: u64,
    /// Deadline for one mining attempt; none when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_nonce: default_max_nonce(),
            timeout_secs: None,
        }
    }
}

impl MiningConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            difficulty_bits: default_difficulty_bits(),
            hash_algorithm: default_hash_algorithm(),
            mining: MiningConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("powchain-data")
}

fn default_difficulty_bits() -> u32 {
    16
}

fn default_hash_algorithm() -> String {
    "blake3".to_string()
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_max_nonce() -> u64 {
    u64::MAX
}

impl ChainConfig {
    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = match fs::read_to_string(path.as_ref()) {
            Ok(text) => Self::from_toml(&text)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: ChainConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.difficulty_bits > MAX_DIFFICULTY_BITS {
            return Err(ConfigError::Invalid(format!(
                "difficulty_bits must be at most {}",
                MAX_DIFFICULTY_BITS
            )));
        }
        if self.mining.workers == 0 {
            return Err(ConfigError::Invalid("mining.workers must be at least 1".into()));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must be set".into()));
        }
        self.crypto_suite()?;
        Ok(())
    }

    /// Crypto suite for the configured hash algorithm
    pub fn crypto_suite(&self) -> Result<CryptoSuite, ConfigError> {
        CryptoSuite::for_algorithm(&self.hash_algorithm).ok_or_else(|| {
            ConfigError::Invalid(format!("unknown hash_algorithm {:?}", self.hash_algorithm))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = ChainConfig::from_toml("").unwrap();
        assert_eq!(config, ChainConfig::default());
        assert_eq!(config.difficulty_bits, 16);
        assert_eq!(config.hash_algorithm, "blake3");
    }

    #[test]
    fn test_partial_toml() {
        let config = ChainConfig::from_toml(
            r#"
            difficulty_bits = 8
            hash_algorithm = "sha256"

            [mining]
            workers = 2
            timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.difficulty_bits, 8);
        assert_eq!(config.mining.workers, 2);
        assert_eq!(config.mining.max_nonce, u64::MAX);
        assert_eq!(config.mining.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.crypto_suite().unwrap().hasher.name(), "sha256");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(ChainConfig::from_toml("difficulty_bits = 300").is_err());
        assert!(ChainConfig::from_toml("hash_algorithm = \"md5\"").is_err());
        assert!(ChainConfig::from_toml("[mining]\nworkers = 0").is_err());
        assert!(ChainConfig::from_toml("difficulty_bits = \"high\"").is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChainConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ChainConfig::default());
    }
}
