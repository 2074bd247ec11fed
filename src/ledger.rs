//! Append-only, hash-linked vote ledger
//!
//! The ledger owns the chain of sealed [`Block`]s and the pending set of
//! staged [`VoteRecord`]s. Sealing moves the whole pending set into a new
//! block and persists the full chain before the block becomes visible.
//!
//! Invariants held by every chain this module accepts:
//! 1. Element 0 is genesis: index 1, previous hash `"1"`, no votes
//! 2. Indices step by exactly one
//! 3. Each `previous_hash` is the hash of the preceding block
//! 4. No voter appears in more than one vote record
//! 5. The hash persisted with each block matches its recomputed hash

use crate::crypto::{CryptoUtils, Digest};
use crate::storage::{JsonFileStore, LoadOutcome};
use crate::types::{
    Block, BlockHash, GENESIS_INDEX, GENESIS_PREVIOUS_HASH, StoredBlock, VoteRecord,
    now_timestamp,
};
use crate::{Error, ErrorKind, Result, integrity_error};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Hash a block over the canonical form of its persisted fields
pub fn hash_block(block: &Block) -> Result<BlockHash> {
    Ok(CryptoUtils::hash_to_hex(&digest_block(block)?))
}

fn digest_block(block: &Block) -> Result<Digest> {
    CryptoUtils::hash_canonical(block)
}

/// How the ledger came up
#[derive(Debug, Clone, PartialEq)]
pub enum StartupState {
    /// A valid chain was read from disk
    Loaded { blocks: usize },
    /// No chain on disk; started from genesis
    Initialized,
    /// The chain on disk was empty or invalid and has been replaced by genesis
    Recovered {
        reason: String,
        quarantined: Option<PathBuf>,
    },
    /// Not backed by a file
    InMemory,
}

/// Types of integrity violations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityViolationType {
    EmptyChain,
    MalformedGenesis,
    IndexGap,
    HashChainBroken,
    DuplicateVoter,
    ContentHashMismatch,
}

/// Integrity violation details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityViolation {
    pub block_index: u64,
    pub violation_type: IntegrityViolationType,
    pub description: String,
}

/// Chain verification report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub blocks_checked: usize,
    pub violations: Vec<IntegrityViolation>,
    pub chain_valid: bool,
}

impl IntegrityReport {
    fn violation(
        &mut self,
        block_index: u64,
        violation_type: IntegrityViolationType,
        description: String,
    ) {
        self.violations.push(IntegrityViolation {
            block_index,
            violation_type,
            description,
        });
        self.chain_valid = false;
    }
}

/// Recompute hashes from genesis forward and check every link
pub fn verify_blocks(blocks: &[Block]) -> IntegrityReport {
    let mut report = IntegrityReport {
        blocks_checked: 0,
        violations: Vec::new(),
        chain_valid: true,
    };

    let Some(genesis) = blocks.first() else {
        report.violation(0, IntegrityViolationType::EmptyChain, "chain has no blocks".to_string());
        return report;
    };

    if genesis.index != GENESIS_INDEX
        || genesis.previous_hash != GENESIS_PREVIOUS_HASH
        || !genesis.votes.is_empty()
    {
        report.violation(
            genesis.index,
            IntegrityViolationType::MalformedGenesis,
            "first block is not a genesis block".to_string(),
        );
    }

    let mut seen_voters = HashSet::new();
    let mut previous: Option<(&Block, Option<Digest>)> = None;

    for block in blocks {
        report.blocks_checked += 1;

        if let Some((prev, prev_digest)) = previous {
            if block.index != prev.index + 1 {
                report.violation(
                    block.index,
                    IntegrityViolationType::IndexGap,
                    format!("index {} does not follow {}", block.index, prev.index),
                );
            }

            let linked = match (prev_digest, CryptoUtils::hex_to_hash(&block.previous_hash)) {
                (Some(expected), Ok(claimed)) => CryptoUtils::constant_time_eq(&expected, &claimed),
                _ => false,
            };
            if !linked {
                report.violation(
                    block.index,
                    IntegrityViolationType::HashChainBroken,
                    "previous hash does not match the preceding block".to_string(),
                );
            }
        }

        for vote in &block.votes {
            if !seen_voters.insert(vote.voter.as_str()) {
                report.violation(
                    block.index,
                    IntegrityViolationType::DuplicateVoter,
                    format!("voter {} appears more than once", vote.voter),
                );
            }
        }

        previous = Some((block, digest_block(block).ok()));
    }

    report
}

/// [`verify_blocks`] plus a check of each block against the hash recorded for it
pub fn verify_sealed(blocks: &[Block], hashes: &[BlockHash]) -> IntegrityReport {
    let mut report = verify_blocks(blocks);

    if blocks.len() != hashes.len() {
        report.violation(
            blocks.len() as u64,
            IntegrityViolationType::ContentHashMismatch,
            format!("{} blocks but {} recorded hashes", blocks.len(), hashes.len()),
        );
        return report;
    }

    for (block, recorded) in blocks.iter().zip(hashes) {
        let matches = match (digest_block(block), CryptoUtils::hex_to_hash(recorded)) {
            (Ok(actual), Ok(recorded)) => CryptoUtils::constant_time_eq(&actual, &recorded),
            _ => false,
        };
        if !matches {
            report.violation(
                block.index,
                IntegrityViolationType::ContentHashMismatch,
                "content does not match the recorded block hash".to_string(),
            );
        }
    }

    report
}

fn voter_index(blocks: &[Block]) -> HashSet<String> {
    blocks
        .iter()
        .flat_map(|b| b.votes.iter().map(|v| v.voter.clone()))
        .collect()
}

/// The vote ledger: sealed chain plus pending set
#[derive(Debug)]
pub struct Ledger {
    chain: Vec<Block>,
    /// Hash of `chain[i]`, computed once when the block was sealed or loaded
    hashes: Vec<BlockHash>,
    sealed_voters: HashSet<String>,
    pending: Vec<VoteRecord>,
    store: Option<JsonFileStore>,
    startup: StartupState,
}

impl Ledger {
    /// A fresh genesis chain that is never written to disk
    pub fn in_memory() -> Result<Self> {
        let genesis = Block::genesis(now_timestamp());
        Ok(Self {
            hashes: vec![hash_block(&genesis)?],
            chain: vec![genesis],
            sealed_voters: HashSet::new(),
            pending: Vec::new(),
            store: None,
            startup: StartupState::InMemory,
        })
    }

    /// Load the chain persisted at `path`, or start a new one
    ///
    /// A missing, empty or structurally invalid file never fails startup:
    /// the ledger reinitializes from genesis and keeps the bad file as
    /// `<name>.corrupt.<timestamp>`. Only genuine I/O failures are returned.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let store = JsonFileStore::new(path);

        let stale = store.temp_path();
        if stale.is_file() {
            warn!("Removing stale temporary ledger file {}", stale.display());
            std::fs::remove_file(&stale)?;
        }

        let (chain, hashes, startup) = match store.load::<Vec<StoredBlock>>() {
            Ok(LoadOutcome::Loaded(stored)) => {
                let (blocks, hashes): (Vec<Block>, Vec<BlockHash>) =
                    stored.into_iter().map(StoredBlock::into_parts).unzip();
                let report = verify_sealed(&blocks, &hashes);
                if report.chain_valid {
                    info!(
                        "Loaded ledger from {} ({} blocks)",
                        store.path().display(),
                        blocks.len()
                    );
                    let count = blocks.len();
                    (blocks, hashes, StartupState::Loaded { blocks: count })
                } else {
                    let reason = report
                        .violations
                        .first()
                        .map(|v| format!("block {}: {}", v.block_index, v.description))
                        .unwrap_or_else(|| "chain failed verification".to_string());
                    Self::recover(&store, reason)?
                }
            }
            Ok(LoadOutcome::Empty) => Self::recover(&store, "ledger file is empty".to_string())?,
            Ok(LoadOutcome::Missing) => {
                info!(
                    "No ledger found at {}, creating new chain with genesis block",
                    store.path().display()
                );
                let genesis = Block::genesis(now_timestamp());
                let hash = hash_block(&genesis)?;
                (vec![genesis], vec![hash], StartupState::Initialized)
            }
            Err(e) if e.kind() == ErrorKind::Integrity => Self::recover(&store, e.to_string())?,
            Err(e) => return Err(e),
        };

        let ledger = Self {
            sealed_voters: voter_index(&chain),
            chain,
            hashes,
            pending: Vec::new(),
            store: Some(store),
            startup,
        };

        if !matches!(ledger.startup, StartupState::Loaded { .. }) {
            ledger.persist()?;
        }

        Ok(ledger)
    }

    /// Data loss on startup: surface it loudly and fall back to genesis
    fn recover(
        store: &JsonFileStore,
        reason: String,
    ) -> Result<(Vec<Block>, Vec<BlockHash>, StartupState)> {
        warn!(
            "Ledger at {} is unusable ({}); reinitializing with genesis block. Previously recorded votes are not loaded",
            store.path().display(),
            reason
        );

        let quarantined = match store.quarantine() {
            Ok(target) => {
                warn!("Unusable ledger preserved at {}", target.display());
                Some(target)
            }
            Err(e) => {
                warn!("Failed to preserve unusable ledger: {}", e);
                None
            }
        };

        let genesis = Block::genesis(now_timestamp());
        let hash = hash_block(&genesis)?;
        Ok((
            vec![genesis],
            vec![hash],
            StartupState::Recovered {
                reason,
                quarantined,
            },
        ))
    }

    fn persist(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let stored: Vec<StoredBlock> = self
            .chain
            .iter()
            .zip(&self.hashes)
            .map(|(block, hash)| StoredBlock::new(block.clone(), hash.clone()))
            .collect();
        store.save(&stored)
    }

    /// Stage a vote; returns the index of the block it will be sealed into
    pub fn stage_vote(&mut self, voter_id: &str, candidate_id: &str) -> u64 {
        self.pending.push(VoteRecord::new(voter_id, candidate_id));
        let next_index = self.last_block().index + 1;
        debug!("Staged vote from {} for block {}", voter_id, next_index);
        next_index
    }

    /// Seal the pending set into a new block and persist the chain
    ///
    /// Either the block is appended, persisted and the pending set cleared,
    /// or nothing changes and the error is returned.
    pub fn append(&mut self, proof: u64) -> Result<Block> {
        let block = Block {
            index: self.last_block().index + 1,
            timestamp: now_timestamp(),
            votes: std::mem::take(&mut self.pending),
            proof,
            previous_hash: self.tip_hash().to_string(),
        };
        let block_hash = match hash_block(&block) {
            Ok(hash) => hash,
            Err(e) => {
                self.pending = block.votes;
                return Err(e);
            }
        };

        self.chain.push(block);
        self.hashes.push(block_hash);
        if let Err(e) = self.persist() {
            self.hashes.pop();
            if let Some(unsealed) = self.chain.pop() {
                self.pending = unsealed.votes;
            }
            warn!("Failed to persist block; chain left unchanged: {}", e);
            return Err(e);
        }

        let sealed = self.last_block().clone();
        self.sealed_voters
            .extend(sealed.votes.iter().map(|v| v.voter.clone()));
        info!(
            "Sealed block {} with {} vote(s)",
            sealed.index,
            sealed.votes.len()
        );
        Ok(sealed)
    }

    /// Drop every staged record without sealing it
    pub fn discard_pending(&mut self) -> Vec<VoteRecord> {
        std::mem::take(&mut self.pending)
    }

    /// Write the chain out again; used on shutdown
    pub fn flush(&self) -> Result<()> {
        if !self.pending.is_empty() {
            warn!(
                "Flushing ledger with {} unsealed vote(s); they are not persisted",
                self.pending.len()
            );
        }
        self.persist()
    }

    pub fn verify_chain(&self) -> bool {
        self.verify_chain_report().chain_valid
    }

    /// Structure, linkage and the cached hash of every block, tip included
    pub fn verify_chain_report(&self) -> IntegrityReport {
        verify_sealed(&self.chain, &self.hashes)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending(&self) -> &[VoteRecord] {
        &self.pending
    }

    /// Hash of the last sealed block
    pub fn tip_hash(&self) -> &str {
        self.hashes.last().map(String::as_str).unwrap_or(GENESIS_PREVIOUS_HASH)
    }

    pub fn last_block(&self) -> &Block {
        // The chain always holds at least genesis
        &self.chain[self.chain.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn startup_state(&self) -> &StartupState {
        &self.startup
    }

    /// Every voter with a sealed vote
    pub fn voters(&self) -> HashSet<&str> {
        self.sealed_voters.iter().map(String::as_str).collect()
    }

    /// Whether `voter_id` already has a sealed vote
    pub fn contains_voter(&self, voter_id: &str) -> bool {
        self.sealed_voters.contains(voter_id)
    }
}

/// Rebuild a ledger view from raw blocks, rejecting anything that fails verification
impl TryFrom<Vec<Block>> for Ledger {
    type Error = Error;

    fn try_from(blocks: Vec<Block>) -> Result<Self> {
        let report = verify_blocks(&blocks);
        if let Some(violation) = report.violations.first() {
            return Err(Error::integrity(format!(
                "block {}: {}",
                violation.block_index, violation.description
            )));
        }
        if blocks.is_empty() {
            return Err(integrity_error!("chain has no blocks"));
        }
        let hashes = blocks.iter().map(hash_block).collect::<Result<Vec<_>>>()?;
        Ok(Self {
            sealed_voters: voter_index(&blocks),
            chain: blocks,
            hashes,
            pending: Vec::new(),
            store: None,
            startup: StartupState::InMemory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GENESIS_PROOF;
    use std::fs;

    fn sealed_chain(votes: &[(&str, &str)]) -> Ledger {
        let mut ledger = Ledger::in_memory().unwrap();
        for (voter, candidate) in votes {
            ledger.stage_vote(voter, candidate);
            ledger.append(123).unwrap();
        }
        ledger
    }

    #[test]
    fn test_stage_returns_next_index() {
        let mut ledger = Ledger::in_memory().unwrap();
        assert_eq!(ledger.stage_vote("123456789012", "A"), 2);
        assert_eq!(ledger.pending().len(), 1);
        // Nothing sealed yet
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_append_links_and_clears_pending() {
        let mut ledger = Ledger::in_memory().unwrap();
        let genesis_hash = hash_block(ledger.last_block()).unwrap();

        ledger.stage_vote("123456789012", "A");
        ledger.stage_vote("223456789012", "B");
        let block = ledger.append(123).unwrap();

        assert_eq!(block.index, 2);
        assert_eq!(block.votes.len(), 2);
        assert_eq!(block.previous_hash, genesis_hash);
        assert_eq!(ledger.tip_hash(), hash_block(&block).unwrap());
        assert_eq!(block.proof, 123);
        assert!(ledger.pending().is_empty());
        assert!(ledger.verify_chain());
    }

    #[test]
    fn test_hash_is_deterministic_and_field_order_independent() {
        let block = Block {
            index: 2,
            timestamp: 1_700_000_000.25,
            votes: vec![VoteRecord::new("123456789012", "A")],
            proof: 123,
            previous_hash: "1".to_string(),
        };
        assert_eq!(hash_block(&block).unwrap(), hash_block(&block.clone()).unwrap());

        let reordered = r#"{
            "previous_hash": "1",
            "votes": [{"candidate": "A", "voter": "123456789012"}],
            "proof": 123,
            "timestamp": 1700000000.25,
            "index": 2
        }"#;
        let parsed: Block = serde_json::from_str(reordered).unwrap();
        assert_eq!(hash_block(&parsed).unwrap(), hash_block(&block).unwrap());
        assert_eq!(hash_block(&block).unwrap().len(), 64);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let genesis = Block::genesis(1.0);
        let mut other = genesis.clone();
        other.proof = GENESIS_PROOF + 1;
        assert_ne!(hash_block(&genesis).unwrap(), hash_block(&other).unwrap());
    }

    #[test]
    fn test_tampered_candidate_breaks_chain() {
        let ledger = sealed_chain(&[("123456789012", "A"), ("223456789012", "B")]);
        let mut blocks = ledger.blocks().to_vec();
        assert!(verify_blocks(&blocks).chain_valid);

        blocks[1].votes[0].candidate = "B".to_string();
        let report = verify_blocks(&blocks);
        assert!(!report.chain_valid);
        assert_eq!(report.violations[0].block_index, 3);
        assert_eq!(
            report.violations[0].violation_type,
            IntegrityViolationType::HashChainBroken
        );
    }

    #[test]
    fn test_verify_rejects_structural_faults() {
        assert!(!verify_blocks(&[]).chain_valid);

        let ledger = sealed_chain(&[("123456789012", "A")]);
        let mut gap = ledger.blocks().to_vec();
        gap[1].index = 5;
        let report = verify_blocks(&gap);
        assert!(report
            .violations
            .iter()
            .any(|v| v.violation_type == IntegrityViolationType::IndexGap));

        let mut bad_genesis = ledger.blocks().to_vec();
        bad_genesis[0].previous_hash = "0".to_string();
        let report = verify_blocks(&bad_genesis);
        assert!(report
            .violations
            .iter()
            .any(|v| v.violation_type == IntegrityViolationType::MalformedGenesis));
    }

    #[test]
    fn test_duplicate_voter_detected() {
        let ledger = sealed_chain(&[("123456789012", "A"), ("123456789012", "B")]);
        let report = ledger.verify_chain_report();
        assert!(!report.chain_valid);
        assert_eq!(
            report.violations[0].violation_type,
            IntegrityViolationType::DuplicateVoter
        );
    }

    #[test]
    fn test_load_persists_genesis_then_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.json");

        let mut ledger = Ledger::load(&path).unwrap();
        assert_eq!(ledger.startup_state(), &StartupState::Initialized);
        assert!(path.exists());

        ledger.stage_vote("123456789012", "A");
        let sealed = ledger.append(123).unwrap();

        let reloaded = Ledger::load(&path).unwrap();
        assert_eq!(reloaded.startup_state(), &StartupState::Loaded { blocks: 2 });
        assert_eq!(reloaded.last_block(), &sealed);
        assert!(reloaded.verify_chain());
        assert!(reloaded.contains_voter("123456789012"));
    }

    #[test]
    fn test_load_recovers_from_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.json");
        {
            let mut ledger = Ledger::load(&path).unwrap();
            ledger.stage_vote("123456789012", "A");
            ledger.append(123).unwrap();
        }

        let data = fs::read(&path).unwrap();
        fs::write(&path, &data[..data.len() / 2]).unwrap();

        let ledger = Ledger::load(&path).unwrap();
        assert_eq!(ledger.len(), 1);
        assert!(ledger.verify_chain());
        match ledger.startup_state() {
            StartupState::Recovered { quarantined, .. } => {
                let preserved = quarantined.as_ref().unwrap();
                assert_eq!(fs::read(preserved).unwrap(), &data[..data.len() / 2]);
            }
            other => panic!("expected recovery, got {other:?}"),
        }
    }

    #[test]
    fn test_load_recovers_from_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.json");
        fs::write(&path, "").unwrap();

        let ledger = Ledger::load(&path).unwrap();
        assert!(matches!(ledger.startup_state(), StartupState::Recovered { .. }));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_failed_persist_leaves_chain_and_pending_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.json");
        let mut ledger = Ledger::load(&path).unwrap();
        let on_disk = fs::read(&path).unwrap();

        fs::create_dir(dir.path().join("chain.json.tmp")).unwrap();
        ledger.stage_vote("123456789012", "A");
        assert!(ledger.append(123).is_err());

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.pending().len(), 1);
        assert_eq!(fs::read(&path).unwrap(), on_disk);
        assert_eq!(ledger.discard_pending().len(), 1);
    }

    #[test]
    fn test_edited_tip_on_disk_is_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.json");
        {
            let mut ledger = Ledger::load(&path).unwrap();
            ledger.stage_vote("123456789012", "A");
            ledger.append(123).unwrap();
        }

        let mut stored: Vec<StoredBlock> =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        stored[1].votes[0].candidate = "B".to_string();
        fs::write(&path, serde_json::to_vec(&stored).unwrap()).unwrap();

        let ledger = Ledger::load(&path).unwrap();
        match ledger.startup_state() {
            StartupState::Recovered { reason, .. } => assert!(reason.contains("block 2")),
            other => panic!("edited tip was accepted: {other:?}"),
        }
        assert!(!ledger.contains_voter("123456789012"));
    }

    #[test]
    fn test_report_flags_mismatched_recorded_hash() {
        let ledger = sealed_chain(&[("123456789012", "A")]);
        let blocks = ledger.blocks().to_vec();
        let mut hashes = ledger.hashes.clone();
        assert!(verify_sealed(&blocks, &hashes).chain_valid);

        hashes[1] = hash_block(&blocks[0]).unwrap();
        let report = verify_sealed(&blocks, &hashes);
        assert!(!report.chain_valid);
        assert_eq!(report.violations[0].block_index, 2);
        assert_eq!(
            report.violations[0].violation_type,
            IntegrityViolationType::ContentHashMismatch
        );

        assert!(!verify_sealed(&blocks, &hashes[..1]).chain_valid);
    }

    #[test]
    fn test_voter_index_tracks_sealed_votes_only() {
        let mut ledger = sealed_chain(&[("123456789012", "A")]);
        ledger.stage_vote("223456789012", "B");
        assert!(ledger.contains_voter("123456789012"));
        assert!(!ledger.contains_voter("223456789012"));

        ledger.append(123).unwrap();
        assert!(ledger.contains_voter("223456789012"));
        assert_eq!(ledger.voters().len(), 2);
    }

    #[test]
    fn test_try_from_blocks() {
        let ledger = sealed_chain(&[("123456789012", "A")]);
        let blocks = ledger.blocks().to_vec();
        assert!(Ledger::try_from(blocks.clone()).is_ok());

        let mut tampered = blocks;
        tampered[0].proof = 7;
        assert!(Ledger::try_from(tampered).is_err());
    }
}
