//! Configuration management for the vote ledger
//!
//! Loads settings from environment variables (and a `.env` file if present)
//! with validated defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Proof value stamped on every sealed block unless overridden
pub const DEFAULT_SEAL_PROOF: u64 = 123;

/// Ledger and registry storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Directory holding the chain and registry files
    pub data_dir: PathBuf,

    /// Chain file name inside `data_dir`
    pub chain_file: String,

    /// Registry snapshot file name inside `data_dir`; `None` keeps voters in memory only
    pub registry_file: Option<String>,

    /// Proof value recorded on sealed blocks (not proof-of-work)
    pub seal_proof: u64,
}

impl LedgerConfig {
    /// Load ledger configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let data_dir = PathBuf::from(
            std::env::var("VOTECHAIN_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
        );

        let chain_file =
            std::env::var("VOTECHAIN_CHAIN_FILE").unwrap_or_else(|_| "chain.json".to_string());
        Self::validate_file_name(&chain_file, "VOTECHAIN_CHAIN_FILE")?;

        // An explicitly empty value disables the snapshot
        let registry_file = match std::env::var("VOTECHAIN_REGISTRY_FILE") {
            Ok(name) if name.is_empty() => None,
            Ok(name) => Some(name),
            Err(_) => Some("voters.json".to_string()),
        };
        if let Some(name) = &registry_file {
            Self::validate_file_name(name, "VOTECHAIN_REGISTRY_FILE")?;
            if *name == chain_file {
                return Err(Error::validation(
                    "VOTECHAIN_REGISTRY_FILE",
                    "must differ from VOTECHAIN_CHAIN_FILE",
                ));
            }
        }

        let seal_proof = std::env::var("VOTECHAIN_SEAL_PROOF")
            .unwrap_or_else(|_| DEFAULT_SEAL_PROOF.to_string())
            .parse()
            .map_err(|_| Error::validation("VOTECHAIN_SEAL_PROOF", "must be an unsigned integer"))?;

        Ok(Self {
            data_dir,
            chain_file,
            registry_file,
            seal_proof,
        })
    }

    /// Create configuration for testing, rooted at `data_dir`
    pub fn for_testing(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            chain_file: "chain.json".to_string(),
            registry_file: Some("voters.json".to_string()),
            seal_proof: DEFAULT_SEAL_PROOF,
        }
    }

    fn validate_file_name(name: &str, var: &str) -> Result<()> {
        let path = Path::new(name);
        if name.is_empty() || path.components().count() != 1 || path.file_name().is_none() {
            return Err(Error::validation(var, "must be a plain file name"));
        }
        Ok(())
    }

    pub fn chain_path(&self) -> PathBuf {
        self.data_dir.join(&self.chain_file)
    }

    pub fn registry_path(&self) -> Option<PathBuf> {
        self.registry_file.as_ref().map(|f| self.data_dir.join(f))
    }
}

/// Registration and login policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Minimum age accepted at registration
    pub min_voter_age: u32,

    /// Minimum number of frames required for a liveness assessment
    pub min_liveness_frames: usize,
}

impl AdmissionConfig {
    pub fn from_env() -> Result<Self> {
        let min_voter_age = std::env::var("VOTECHAIN_MIN_VOTER_AGE")
            .unwrap_or_else(|_| "18".to_string())
            .parse()
            .map_err(|_| Error::validation("VOTECHAIN_MIN_VOTER_AGE", "must be an unsigned integer"))?;

        let min_liveness_frames: usize = std::env::var("VOTECHAIN_MIN_LIVENESS_FRAMES")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map_err(|_| {
                Error::validation("VOTECHAIN_MIN_LIVENESS_FRAMES", "must be an unsigned integer")
            })?;
        if min_liveness_frames == 0 {
            return Err(Error::validation(
                "VOTECHAIN_MIN_LIVENESS_FRAMES",
                "must be at least 1",
            ));
        }

        Ok(Self {
            min_voter_age,
            min_liveness_frames,
        })
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_voter_age: 18,
            min_liveness_frames: 5,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub admission: AdmissionConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment
    pub fn from_env() -> Result<Self> {
        let ledger = LedgerConfig::from_env()?;
        let admission = AdmissionConfig::from_env()?;

        let logging = LoggingConfig {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
        };

        Ok(Self {
            ledger,
            admission,
            logging,
        })
    }

    /// Create configuration for testing
    pub fn for_testing(data_dir: impl AsRef<Path>) -> Self {
        Self {
            ledger: LedgerConfig::for_testing(data_dir),
            admission: AdmissionConfig::default(),
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_testing_config_paths() {
        let config = Config::for_testing("/tmp/votechain-test");
        assert_eq!(
            config.ledger.chain_path(),
            PathBuf::from("/tmp/votechain-test/chain.json")
        );
        assert_eq!(
            config.ledger.registry_path(),
            Some(PathBuf::from("/tmp/votechain-test/voters.json"))
        );
        assert_eq!(config.ledger.seal_proof, DEFAULT_SEAL_PROOF);
        assert_eq!(config.admission.min_voter_age, 18);
    }

    #[test]
    fn test_file_name_validation() {
        assert!(LedgerConfig::validate_file_name("chain.json", "TEST").is_ok());
        assert!(LedgerConfig::validate_file_name("", "TEST").is_err());
        assert!(LedgerConfig::validate_file_name("../chain.json", "TEST").is_err());
        assert!(LedgerConfig::validate_file_name("nested/chain.json", "TEST").is_err());
    }

    #[test]
    fn test_in_memory_registry_has_no_path() {
        let mut config = LedgerConfig::for_testing("/tmp/votechain-test");
        config.registry_file = None;
        assert!(config.registry_path().is_none());
    }
}
