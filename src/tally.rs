//! Vote counting over the ledger
//!
//! Counts are always derived from sealed blocks; no running total is kept,
//! so a tally can never drift from ledger content.

use crate::types::{Block, VoteResult};
use std::collections::BTreeMap;

/// Stateless tally over a chain of blocks
pub struct TallyEngine;

impl TallyEngine {
    /// Count votes per candidate across every block except genesis
    pub fn tally(blocks: &[Block]) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for block in blocks.iter().filter(|b| !b.is_genesis()) {
            for vote in &block.votes {
                *counts.entry(vote.candidate.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Total number of sealed votes
    pub fn total(blocks: &[Block]) -> u64 {
        blocks
            .iter()
            .filter(|b| !b.is_genesis())
            .map(|b| b.votes.len() as u64)
            .sum()
    }

    /// Per-candidate results, most votes first, ties broken by candidate id
    pub fn results(blocks: &[Block]) -> Vec<VoteResult> {
        let counts = Self::tally(blocks);
        let total: u64 = counts.values().sum();

        let mut results: Vec<VoteResult> = counts
            .into_iter()
            .map(|(candidate_id, vote_count)| VoteResult {
                candidate_id,
                vote_count,
                percentage: if total == 0 {
                    0.0
                } else {
                    vote_count as f64 * 100.0 / total as f64
                },
            })
            .collect();

        results.sort_by(|a, b| {
            b.vote_count
                .cmp(&a.vote_count)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        results
    }
}
