//! Voter registry with atomic cast-a-vote status
//!
//! `mark_voted` is a compare-and-swap on the `has_voted` flag performed
//! under the registry's write lock: of any number of concurrent callers for
//! the same voter exactly one succeeds and the rest get a conflict.

use crate::storage::{JsonFileStore, LoadOutcome};
use crate::types::Voter;
use crate::validation::{validate_name, validate_voter_id};
use crate::{Error, Result, internal_error};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{info, warn};

/// Registry operations the coordinator depends on
pub trait VoterRegistry: Send + Sync {
    /// Add a new voter; `Conflict` if the id is taken
    fn register(&self, voter: Voter) -> Result<()>;

    fn lookup(&self, voter_id: &str) -> Result<Voter>;

    /// Flip `has_voted` false → true; `Conflict` if already set
    fn mark_voted(&self, voter_id: &str) -> Result<()>;

    /// Undo a mark whose ledger half failed to commit
    fn unmark_voted(&self, voter_id: &str) -> Result<()>;

    fn voters(&self) -> Result<Vec<Voter>>;

    /// Persist current state, if the registry is durable
    fn flush(&self) -> Result<()>;
}

/// Hash-map backed registry with an optional JSON snapshot on disk
#[derive(Debug, Default)]
pub struct LocalVoterRegistry {
    voters: RwLock<HashMap<String, Voter>>,
    store: Option<JsonFileStore>,
}

impl LocalVoterRegistry {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the snapshot at `path`
    ///
    /// Unlike the ledger, registrations cannot be re-derived, so an
    /// unreadable snapshot fails startup instead of being replaced.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = JsonFileStore::new(path);

        let voters = match store.load::<Vec<Voter>>()? {
            LoadOutcome::Loaded(list) => {
                info!(
                    "Loaded {} registered voter(s) from {}",
                    list.len(),
                    store.path().display()
                );
                let mut voters = HashMap::with_capacity(list.len());
                for voter in list {
                    if voters.contains_key(&voter.id) {
                        return Err(Error::integrity(format!(
                            "voter {} registered twice in {}",
                            voter.id,
                            store.path().display()
                        )));
                    }
                    voters.insert(voter.id.clone(), voter);
                }
                voters
            }
            LoadOutcome::Missing | LoadOutcome::Empty => HashMap::new(),
        };

        Ok(Self {
            voters: RwLock::new(voters),
            store: Some(store),
        })
    }

    /// Align every `has_voted` flag with ledger membership
    ///
    /// The ledger is the source of truth: a voter with a sealed vote is
    /// marked, a flagged voter without one is cleared. Returns how many
    /// flags changed.
    pub fn reconcile(&self, ledger_voters: &HashSet<&str>) -> Result<usize> {
        let mut voters = self
            .voters
            .write()
            .map_err(|_| internal_error!("Registry write lock poisoned"))?;

        let mut changed = 0;
        for voter in voters.values_mut() {
            let in_ledger = ledger_voters.contains(voter.id.as_str());
            if voter.has_voted != in_ledger {
                warn!(
                    "Voter {} has_voted={} disagrees with ledger; correcting to {}",
                    voter.id, voter.has_voted, in_ledger
                );
                voter.has_voted = in_ledger;
                changed += 1;
            }
        }

        for id in ledger_voters {
            if !voters.contains_key(*id) {
                warn!("Ledger holds a vote from unregistered voter {}", id);
            }
        }

        drop(voters);
        if changed > 0 {
            self.flush()?;
        }
        Ok(changed)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self
            .voters
            .read()
            .map_err(|_| internal_error!("Registry read lock poisoned"))?
            .len())
    }

    fn snapshot(voters: &HashMap<String, Voter>) -> Vec<Voter> {
        let mut list: Vec<Voter> = voters.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }
}

impl VoterRegistry for LocalVoterRegistry {
    fn register(&self, voter: Voter) -> Result<()> {
        validate_voter_id(&voter.id)?;
        validate_name(&voter.name)?;

        let mut voters = self
            .voters
            .write()
            .map_err(|_| internal_error!("Registry write lock poisoned"))?;

        if voters.contains_key(&voter.id) {
            return Err(Error::conflict(format!(
                "voter {} is already registered",
                voter.id
            )));
        }

        let id = voter.id.clone();
        voters.insert(id.clone(), Voter {
            has_voted: false,
            ..voter
        });

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&Self::snapshot(&voters)) {
                voters.remove(&id);
                return Err(e);
            }
        }

        info!("Registered voter {}", id);
        Ok(())
    }

    fn lookup(&self, voter_id: &str) -> Result<Voter> {
        self.voters
            .read()
            .map_err(|_| internal_error!("Registry read lock poisoned"))?
            .get(voter_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("voter {voter_id}")))
    }

    fn mark_voted(&self, voter_id: &str) -> Result<()> {
        let mut voters = self
            .voters
            .write()
            .map_err(|_| internal_error!("Registry write lock poisoned"))?;

        let voter = voters
            .get_mut(voter_id)
            .ok_or_else(|| Error::not_found(format!("voter {voter_id}")))?;

        if voter.has_voted {
            return Err(Error::conflict(format!(
                "voter {voter_id} has already cast their vote"
            )));
        }
        voter.has_voted = true;
        Ok(())
    }

    fn unmark_voted(&self, voter_id: &str) -> Result<()> {
        let mut voters = self
            .voters
            .write()
            .map_err(|_| internal_error!("Registry write lock poisoned"))?;

        let voter = voters
            .get_mut(voter_id)
            .ok_or_else(|| Error::not_found(format!("voter {voter_id}")))?;
        voter.has_voted = false;
        warn!("Rolled back has_voted for voter {}", voter_id);
        Ok(())
    }

    fn voters(&self) -> Result<Vec<Voter>> {
        let voters = self
            .voters
            .read()
            .map_err(|_| internal_error!("Registry read lock poisoned"))?;
        Ok(Self::snapshot(&voters))
    }

    fn flush(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let snapshot = {
            let voters = self
                .voters
                .read()
                .map_err(|_| internal_error!("Registry read lock poisoned"))?;
            Self::snapshot(&voters)
        };
        store.save(&snapshot)
    }
}
