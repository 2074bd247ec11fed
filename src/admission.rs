//! Voter admission: registration and biometric login
//!
//! Identity lookup, face matching and liveness assessment are provided by
//! external services behind the traits below. This module only sequences
//! them and applies the admission policy before a voter reaches
//! [`VoteCoordinator::cast_vote`].

use crate::config::AdmissionConfig;
use crate::coordinator::VoteCoordinator;
use crate::registry::{LocalVoterRegistry, VoterRegistry};
use crate::types::{IdentityRecord, Voter};
use crate::validation::validate_voter_id;
use crate::{Error, ErrorKind, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One captured camera frame, encoded however the capture side chose
pub type Frame = Vec<u8>;

/// External citizen directory
pub trait IdentityDirectory: Send + Sync {
    /// `NotFound` when the id is unknown to the directory
    fn lookup(&self, external_id: &str) -> Result<IdentityRecord>;
}

/// Face matching against a stored biometric reference
pub trait BiometricMatcher: Send + Sync {
    fn verify(&self, reference: &str, frame: &[u8]) -> Result<bool>;
}

/// Multi-frame check that the subject is live and present
pub trait LivenessChecker: Send + Sync {
    fn assess(&self, frames: &[Frame]) -> Result<bool>;
}

pub struct AdmissionService<R: VoterRegistry = LocalVoterRegistry> {
    coordinator: Arc<VoteCoordinator<R>>,
    directory: Arc<dyn IdentityDirectory>,
    matcher: Arc<dyn BiometricMatcher>,
    liveness: Arc<dyn LivenessChecker>,
    config: AdmissionConfig,
}

impl<R: VoterRegistry> AdmissionService<R> {
    pub fn new(
        coordinator: Arc<VoteCoordinator<R>>,
        directory: Arc<dyn IdentityDirectory>,
        matcher: Arc<dyn BiometricMatcher>,
        liveness: Arc<dyn LivenessChecker>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            coordinator,
            directory,
            matcher,
            liveness,
            config,
        }
    }

    /// Register a voter known to the identity directory
    pub fn register(&self, external_id: &str, biometric_ref: &str) -> Result<Voter> {
        validate_voter_id(external_id)?;

        match self.coordinator.lookup_voter(external_id) {
            Ok(_) => {
                return Err(Error::conflict(format!(
                    "voter {external_id} is already registered"
                )));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let identity = self.directory.lookup(external_id)?;
        if identity.age < self.config.min_voter_age {
            return Err(Error::validation(
                "age",
                format!("voter must be {} or older", self.config.min_voter_age),
            ));
        }

        let voter = self
            .coordinator
            .register_voter(external_id, &identity.name, biometric_ref)?;
        info!("Admitted voter {} from identity directory", external_id);
        Ok(voter)
    }

    /// Identify a live voter from camera frames
    ///
    /// Returns the first registered voter whose reference matches any frame.
    /// A voter who has already voted is refused with `Conflict`.
    pub fn authenticate(&self, frames: &[Frame]) -> Result<Voter> {
        if frames.len() < self.config.min_liveness_frames {
            return Err(Error::validation(
                "frames",
                format!(
                    "at least {} frames are required for liveness detection",
                    self.config.min_liveness_frames
                ),
            ));
        }

        if !self.liveness.assess(frames)? {
            warn!("Liveness check failed");
            return Err(Error::validation("frames", "liveness check failed"));
        }

        for voter in self.coordinator.registry().voters()? {
            for frame in frames {
                match self.matcher.verify(&voter.biometric_ref, frame) {
                    Ok(true) => {
                        if voter.has_voted {
                            return Err(Error::conflict(format!(
                                "voter {} has already voted",
                                voter.id
                            )));
                        }
                        info!("Authenticated voter {}", voter.id);
                        return Ok(voter);
                    }
                    Ok(false) => {}
                    // A frame the matcher cannot process just doesn't match
                    Err(e) => debug!("Matcher error against voter {}: {}", voter.id, e),
                }
            }
        }

        Err(Error::not_found("no registered voter matches the presented face"))
    }
}
