//! Identifier validation applied at the API boundary

use crate::{Error, Result};

/// Voter identifiers are national-id numbers of exactly this many digits
pub const VOTER_ID_LENGTH: usize = 12;

/// Upper bound on candidate identifier length, in characters
pub const MAX_CANDIDATE_ID_LENGTH: usize = 64;

/// Upper bound on display name length, in characters
pub const MAX_NAME_LENGTH: usize = 100;

/// A voter id is exactly twelve ASCII digits
pub fn validate_voter_id(voter_id: &str) -> Result<()> {
    if voter_id.len() != VOTER_ID_LENGTH || !voter_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::validation(
            "voter_id",
            format!("must be exactly {VOTER_ID_LENGTH} digits"),
        ));
    }
    Ok(())
}

pub fn validate_candidate_id(candidate_id: &str) -> Result<()> {
    if candidate_id.trim().is_empty() {
        return Err(Error::validation("candidate_id", "must not be empty"));
    }
    if candidate_id.chars().count() > MAX_CANDIDATE_ID_LENGTH {
        return Err(Error::validation(
            "candidate_id",
            format!("must be at most {MAX_CANDIDATE_ID_LENGTH} characters"),
        ));
    }
    if candidate_id.chars().any(char::is_control) {
        return Err(Error::validation(
            "candidate_id",
            "must not contain control characters",
        ));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::validation(
            "name",
            format!("must be at most {MAX_NAME_LENGTH} characters"),
        ));
    }
    Ok(())
}
