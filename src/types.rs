//! # Core Types for the Vote Ledger
//!
//! Data structures shared by the ledger, the voter registry and the
//! coordinator. Everything that reaches disk derives [`Serialize`] and
//! [`Deserialize`] and uses the field names of the persisted format.
//!
//! ## Type Categories
//!
//! ### Ledger content
//! - [`VoteRecord`]: a single voter → candidate choice
//! - [`Block`]: an immutable, hash-linked batch of vote records
//!
//! ### Voter state
//! - [`Voter`]: a registered voter and their `has_voted` flag
//! - [`VoterStatus`]: the two states of the per-voter state machine
//!
//! ### Results
//! - [`VoteResult`]: per-candidate aggregate derived from the ledger
//! - [`CastReceipt`]: what a voter gets back once their vote is sealed
//!
//! ## Usage Examples
//!
//! ```rust
//! use votechain::types::*;
//!
//! let genesis = Block::genesis(1_700_000_000.0);
//! assert_eq!(genesis.index, 1);
//! assert_eq!(genesis.previous_hash, GENESIS_PREVIOUS_HASH);
//! assert!(genesis.votes.is_empty());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hex-encoded 256-bit block digest (64 lowercase hex characters)
pub type BlockHash = String;

/// Seconds since the Unix epoch, with sub-second precision
///
/// Persisted as a JSON number so ledgers written by earlier deployments
/// (which recorded fractional seconds) keep their hashes.
pub type Timestamp = f64;

/// Sentinel `previous_hash` carried by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "1";

/// Proof value carried by the genesis block
pub const GENESIS_PROOF: u64 = 100;

/// Index of the genesis block; indices are 1-based
pub const GENESIS_INDEX: u64 = 1;

/// Current wall-clock time as a ledger timestamp
pub fn now_timestamp() -> Timestamp {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A single vote: which voter chose which candidate
///
/// Immutable once sealed into a [`Block`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoteRecord {
    /// Voter identifier (12-digit national id)
    pub voter: String,

    /// Candidate identifier
    pub candidate: String,
}

impl VoteRecord {
    pub fn new(voter: impl Into<String>, candidate: impl Into<String>) -> Self {
        Self {
            voter: voter.into(),
            candidate: candidate.into(),
        }
    }
}

/// A sealed block of the vote ledger
///
/// The block's own hash is derived (see [`crate::ledger::hash_block`]) over
/// these five fields; on disk it travels alongside them in a [`StoredBlock`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Block {
    /// Position in the chain, starting at 1 for genesis
    pub index: u64,

    /// Seal time
    pub timestamp: Timestamp,

    /// Vote records sealed into this block, in staging order
    pub votes: Vec<VoteRecord>,

    /// Proof value supplied by the sealer
    pub proof: u64,

    /// Hash of the preceding block, or [`GENESIS_PREVIOUS_HASH`]
    pub previous_hash: BlockHash,
}

impl Block {
    /// Build the genesis block: sentinel previous hash, fixed proof, no votes
    pub fn genesis(timestamp: Timestamp) -> Self {
        Self {
            index: GENESIS_INDEX,
            timestamp,
            votes: Vec::new(),
            proof: GENESIS_PROOF,
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.index == GENESIS_INDEX
    }

    /// Whether this block holds a vote from `voter_id`
    pub fn contains_voter(&self, voter_id: &str) -> bool {
        self.votes.iter().any(|v| v.voter == voter_id)
    }
}

/// On-disk form of a block: the hashed fields plus the hash itself
///
/// Storing every block's hash lets a load notice an edited newest block,
/// which no successor links to yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoredBlock {
    pub index: u64,
    pub timestamp: Timestamp,
    pub votes: Vec<VoteRecord>,
    pub proof: u64,
    pub previous_hash: BlockHash,
    pub hash: BlockHash,
}

impl StoredBlock {
    pub fn new(block: Block, hash: BlockHash) -> Self {
        Self {
            index: block.index,
            timestamp: block.timestamp,
            votes: block.votes,
            proof: block.proof,
            previous_hash: block.previous_hash,
            hash,
        }
    }

    /// Split into the hashed block and the hash recorded for it
    pub fn into_parts(self) -> (Block, BlockHash) {
        (
            Block {
                index: self.index,
                timestamp: self.timestamp,
                votes: self.votes,
                proof: self.proof,
                previous_hash: self.previous_hash,
            },
            self.hash,
        )
    }
}

/// A registered voter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    /// Unique, immutable identifier (12-digit national id)
    pub id: String,

    /// Display name, as returned by the identity directory
    pub name: String,

    /// Opaque pointer to the stored biometric reference (e.g. image path)
    pub biometric_ref: String,

    /// Set exactly once, in lockstep with the voter's ledger entry
    #[serde(default)]
    pub has_voted: bool,
}

impl Voter {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        biometric_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            biometric_ref: biometric_ref.into(),
            has_voted: false,
        }
    }

    pub fn status(&self) -> VoterStatus {
        if self.has_voted {
            VoterStatus::Voted
        } else {
            VoterStatus::Registered
        }
    }
}

/// Per-voter state machine: `Registered` → `Voted`, no way back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoterStatus {
    Registered,
    Voted,
}

/// Per-candidate aggregate derived from the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteResult {
    /// Candidate identifier
    pub candidate_id: String,

    /// Number of sealed votes for the candidate
    pub vote_count: u64,

    /// Share of all sealed votes, 0.0 to 100.0
    pub percentage: f64,
}

/// Returned to the caller of a successful cast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastReceipt {
    /// Unique id for this cast, for support and audit lookups
    pub receipt_id: Uuid,

    /// Index of the block the vote was sealed into
    pub block_index: u64,

    /// Hash of that block
    pub block_hash: BlockHash,

    pub sealed_at: DateTime<Utc>,
}

/// Record returned by an identity directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub name: String,
    pub age: u32,
    pub contact: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis(now_timestamp());
        assert!(genesis.is_genesis());
        assert_eq!(genesis.proof, GENESIS_PROOF);
        assert_eq!(genesis.previous_hash, "1");
        assert!(genesis.votes.is_empty());
    }

    #[test]
    fn test_block_wire_format() {
        let block = Block {
            index: 2,
            timestamp: 1_700_000_000.5,
            votes: vec![VoteRecord::new("123456789012", "A")],
            proof: 123,
            previous_hash: "ab".repeat(32),
        };

        let value = serde_json::to_value(&block).unwrap();
        let object = value.as_object().unwrap();
        for field in ["index", "timestamp", "votes", "proof", "previous_hash"] {
            assert!(object.contains_key(field), "missing {field}");
        }
        assert_eq!(value["votes"][0]["voter"], "123456789012");
        assert_eq!(value["votes"][0]["candidate"], "A");
        assert!(block.contains_voter("123456789012"));
        assert!(!block.contains_voter("000000000000"));
    }

    #[test]
    fn test_block_rejects_missing_fields() {
        let missing_proof = r#"{"index":1,"timestamp":1.0,"votes":[],"previous_hash":"1"}"#;
        assert!(serde_json::from_str::<Block>(missing_proof).is_err());
    }

    #[test]
    fn test_voter_status() {
        let mut voter = Voter::new("123456789012", "Asha", "faces/123.jpg");
        assert_eq!(voter.status(), VoterStatus::Registered);
        voter.has_voted = true;
        assert_eq!(voter.status(), VoterStatus::Voted);
    }
}
