//! Tamper-evident Vote Ledger
//!
//! An append-only, hash-linked block store for votes together with the
//! voter state engine that guarantees at most one vote per voter.

pub mod admission;
pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod errors;
pub mod ledger;
pub mod registry;
pub mod storage;
pub mod tally;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use coordinator::{ChainDump, VoteCoordinator};
pub use errors::{Error, ErrorKind, Result};
pub use ledger::{Ledger, hash_block};
pub use registry::{LocalVoterRegistry, VoterRegistry};
pub use tally::TallyEngine;

use config::LoggingConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging with defaults (`RUST_LOG`, falling back to `votechain=info`)
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "votechain=info".into()),
        )
        .try_init()
        .map_err(|e| Error::internal(format!("Failed to install logger: {e}")))?;

    tracing::info!("🗳️  Vote ledger v{} initialized", VERSION);
    Ok(())
}

/// Initialize logging from configuration; `json` or `pretty` output
pub fn init_with(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("votechain={}", logging.level).into());

    let installed = match logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        "pretty" => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .try_init(),
        other => {
            return Err(Error::validation(
                "LOG_FORMAT",
                format!("unsupported format '{other}', expected json or pretty"),
            ));
        }
    };
    installed.map_err(|e| Error::internal(format!("Failed to install logger: {e}")))?;

    tracing::info!("🗳️  Vote ledger v{} initialized", VERSION);
    Ok(())
}
