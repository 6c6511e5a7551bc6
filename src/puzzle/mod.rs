//! Persistent pool of proof-of-work seeds.
//!
//! A seed is a random string that reveals a page id (CPU puzzles) or a single
//! character of one (core puzzles) after a fixed number of md5 rounds, see
//! [`hash::iterate_digest`]. Seeds are found by brute force, kept in a JSON file and
//! handed out to page requests through [`PuzzleCache`].

pub mod cache;
pub mod hash;
pub mod pool;
pub mod reservation;
pub mod store;

use std::path::PathBuf;

use thiserror::Error;

use crate::id_space::IdSpaceError;

pub use cache::{CacheInfo, PuzzleCache};
pub use reservation::ReservationSet;
pub use store::CacheFile;

/// Opaque work unit handed to clients
pub type Seed = String;

/// Length of generated seeds
pub const SEED_LENGTH: usize = 16;

/// Left padding for core targets shorter than the id length
pub const CORE_FILLER: char = '0';

/// What to do when every seed for a target has already been issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IssuePolicy {
    /// Never hand out a seed twice; the target is declined instead
    #[default]
    Strict,
    /// Reissue an already used seed, so two clients may get the same work
    Relaxed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PuzzleSettings {
    pub id_length: usize,
    pub cpu_iterations: u64,
    pub core_iterations: u64,
    pub seed_length: usize,
    pub policy: IssuePolicy,
}

impl Default for PuzzleSettings {
    fn default() -> Self {
        Self {
            id_length: 6,
            cpu_iterations: 5_000_000,
            core_iterations: 1_250_000,
            seed_length: SEED_LENGTH,
            policy: IssuePolicy::Strict,
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cannot persist puzzle cache at {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed puzzle cache: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    IdSpace(#[from] IdSpaceError),
    #[error("gave up on {what} after {attempts} attempts")]
    CoverageUnavailable { what: String, attempts: u64 },
}
