//! Vote-casting transactions across the registry and the ledger
//!
//! `cast_vote` runs under a single global commit lock:
//! 1. Validate identifiers
//! 2. Look the voter up (`NotFound`)
//! 3. Refuse voters the ledger already holds a vote for (`Conflict`)
//! 4. Mark the voter as voted (`Conflict` if already set)
//! 5. Stage the vote and seal it into its own block
//!
//! The rename of the persisted chain inside step 5 is the only commit
//! point. If anything in step 5 fails, the staged record is discarded and
//! the registry mark is rolled back, so the vote is not considered cast.
//!
//! The ledger sits behind a reader-writer lock. Readers (`tally`,
//! `dump_chain`, `verify_chain`) only ever see fully sealed blocks.

use crate::config::LedgerConfig;
use crate::ledger::{IntegrityReport, Ledger};
use crate::registry::{LocalVoterRegistry, VoterRegistry};
use crate::tally::TallyEngine;
use crate::types::{Block, CastReceipt, VoteResult, Voter};
use crate::validation::{validate_candidate_id, validate_voter_id};
use crate::{Error, ErrorKind, Result, internal_error};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Full ledger contents as handed to the API layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDump {
    pub chain: Vec<Block>,
    pub length: usize,
}

/// Single process-wide owner of the registry and the ledger
pub struct VoteCoordinator<R: VoterRegistry = LocalVoterRegistry> {
    registry: Arc<R>,
    ledger: RwLock<Ledger>,
    commit_lock: Mutex<()>,
    seal_proof: u64,
}

impl VoteCoordinator<LocalVoterRegistry> {
    /// Load the ledger and registry from disk and reconcile them
    pub fn open(config: &LedgerConfig) -> Result<Self> {
        let ledger = Ledger::load(config.chain_path())?;

        let registry = match config.registry_path() {
            Some(path) => LocalVoterRegistry::open(path)?,
            None => LocalVoterRegistry::in_memory(),
        };

        let corrected = registry.reconcile(&ledger.voters())?;
        if corrected > 0 {
            warn!("Corrected {} voter flag(s) against the ledger", corrected);
        }

        info!(
            "Vote coordinator ready: {} block(s), {} registered voter(s)",
            ledger.len(),
            registry.len()?
        );

        Ok(Self::new(Arc::new(registry), ledger, config.seal_proof))
    }

    /// Non-durable coordinator, for tests and tooling
    pub fn in_memory(seal_proof: u64) -> Result<Self> {
        Ok(Self::new(
            Arc::new(LocalVoterRegistry::in_memory()),
            Ledger::in_memory()?,
            seal_proof,
        ))
    }
}

impl<R: VoterRegistry> VoteCoordinator<R> {
    pub fn new(registry: Arc<R>, ledger: Ledger, seal_proof: u64) -> Self {
        Self {
            registry,
            ledger: RwLock::new(ledger),
            commit_lock: Mutex::new(()),
            seal_proof,
        }
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    fn read_ledger(&self) -> Result<RwLockReadGuard<'_, Ledger>> {
        self.ledger
            .read()
            .map_err(|_| internal_error!("Ledger read lock poisoned"))
    }

    fn lock_commit(&self) -> Result<MutexGuard<'_, ()>> {
        self.commit_lock
            .lock()
            .map_err(|_| internal_error!("Commit lock poisoned"))
    }

    /// Set the registry flag for a voter the ledger already holds a vote for
    fn mark_from_ledger(&self, voter_id: &str) -> Result<()> {
        match self.registry.mark_voted(voter_id) {
            Ok(()) => {
                warn!("Voter {} has a sealed vote; registry flag restored", voter_id);
                if let Err(e) = self.registry.flush() {
                    warn!("Failed to persist restored flag for {}: {}", voter_id, e);
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::Conflict => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Register a voter
    ///
    /// A voter whose id already appears in the ledger (registrations lost
    /// with the registry snapshot) comes back already voted.
    pub fn register_voter(
        &self,
        voter_id: &str,
        name: &str,
        biometric_ref: &str,
    ) -> Result<Voter> {
        let _commit = self.lock_commit()?;

        let mut voter = Voter::new(voter_id, name.trim(), biometric_ref);
        self.registry.register(voter.clone())?;

        if self.read_ledger()?.contains_voter(voter_id) {
            self.mark_from_ledger(voter_id)?;
            voter.has_voted = true;
        }
        Ok(voter)
    }

    pub fn lookup_voter(&self, voter_id: &str) -> Result<Voter> {
        validate_voter_id(voter_id)?;
        self.registry.lookup(voter_id)
    }

    /// Cast one vote and seal it into its own block
    pub fn cast_vote(&self, voter_id: &str, candidate_id: &str) -> Result<CastReceipt> {
        validate_voter_id(voter_id)?;
        validate_candidate_id(candidate_id)?;

        let _commit = self.lock_commit()?;

        self.registry.lookup(voter_id)?;
        if self.read_ledger()?.contains_voter(voter_id) {
            self.mark_from_ledger(voter_id)?;
            return Err(Error::conflict(format!(
                "Voter {voter_id} already has a vote sealed in the ledger"
            )));
        }
        self.registry.mark_voted(voter_id)?;

        let (block, block_hash) = match self.seal_vote(voter_id, candidate_id) {
            Ok(sealed) => sealed,
            Err(e) => {
                if let Err(rollback) = self.registry.unmark_voted(voter_id) {
                    error!(
                        "Failed to roll back vote mark for {} after ledger failure: {}",
                        voter_id, rollback
                    );
                }
                warn!("Vote from {} aborted: {}", voter_id, e);
                return Err(e);
            }
        };

        // Committed. The ledger is authoritative from here; a stale registry
        // snapshot is corrected on the next startup.
        if let Err(e) = self.registry.flush() {
            warn!("Failed to persist registry after sealing block {}: {}", block.index, e);
        }

        info!("Vote from {} sealed in block {}", voter_id, block.index);
        Ok(CastReceipt {
            receipt_id: Uuid::new_v4(),
            block_index: block.index,
            block_hash,
            sealed_at: Utc::now(),
        })
    }

    fn seal_vote(&self, voter_id: &str, candidate_id: &str) -> Result<(Block, String)> {
        let mut ledger = self
            .ledger
            .write()
            .map_err(|_| internal_error!("Ledger write lock poisoned"))?;

        if !ledger.pending().is_empty() {
            return Err(internal_error!(
                "{} unsealed vote(s) left from an earlier transaction",
                ledger.pending().len()
            ));
        }

        let expected_index = ledger.stage_vote(voter_id, candidate_id);
        match ledger.append(self.seal_proof) {
            Ok(block) => {
                debug_assert_eq!(block.index, expected_index);
                Ok((block, ledger.tip_hash().to_string()))
            }
            Err(e) => {
                ledger.discard_pending();
                Err(e)
            }
        }
    }

    /// Votes per candidate, derived from the ledger
    pub fn tally(&self) -> Result<BTreeMap<String, u64>> {
        Ok(TallyEngine::tally(self.read_ledger()?.blocks()))
    }

    pub fn results(&self) -> Result<Vec<VoteResult>> {
        Ok(TallyEngine::results(self.read_ledger()?.blocks()))
    }

    pub fn dump_chain(&self) -> Result<ChainDump> {
        let ledger = self.read_ledger()?;
        Ok(ChainDump {
            chain: ledger.blocks().to_vec(),
            length: ledger.len(),
        })
    }

    pub fn chain_length(&self) -> Result<usize> {
        Ok(self.read_ledger()?.len())
    }

    pub fn verify_chain(&self) -> Result<bool> {
        Ok(self.read_ledger()?.verify_chain())
    }

    pub fn verify_chain_report(&self) -> Result<IntegrityReport> {
        Ok(self.read_ledger()?.verify_chain_report())
    }

    /// Flush both stores and log the final chain state
    ///
    /// Waits for any in-flight cast to finish first.
    pub fn shutdown(&self) -> Result<()> {
        let _commit = self.lock_commit()?;

        self.registry.flush()?;

        let ledger = self.read_ledger()?;
        ledger.flush()?;

        let report = ledger.verify_chain_report();
        if report.chain_valid {
            info!(
                "Shutdown complete: {} block(s), tip {}",
                ledger.len(),
                ledger.tip_hash()
            );
        } else {
            error!(
                "Shutdown with {} integrity violation(s) in the chain",
                report.violations.len()
            );
        }
        Ok(())
    }
}

impl<R: VoterRegistry + 'static> VoteCoordinator<R> {
    /// Run [`Self::cast_vote`] on tokio's blocking pool
    ///
    /// Sealing does synchronous file I/O, so async callers should not run it
    /// on a runtime worker thread.
    pub async fn cast_vote_async(
        self: &Arc<Self>,
        voter_id: String,
        candidate_id: String,
    ) -> Result<CastReceipt> {
        let coordinator = Arc::clone(self);
        tokio::task::spawn_blocking(move || coordinator.cast_vote(&voter_id, &candidate_id))
            .await
            .map_err(|e| Error::internal(format!("Vote task failed: {e}")))?
    }
}
