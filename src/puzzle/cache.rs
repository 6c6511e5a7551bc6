use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log2::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use rand::seq::IndexedRandom;
use rayon::prelude::*;
use serde::Serialize;

use super::hash::{core_target, cpu_target};
use super::pool::{CoreBuckets, SeedPools};
use super::reservation::ReservationSet;
use super::store::{self, CacheFile};
use super::{CORE_FILLER, CacheError, IssuePolicy, PuzzleSettings, Seed};
use crate::graph::PageId;
use crate::id_space::{HEX_ALPHABET, IdSpaceError, random_id, space_size};

/// Seeds hashed per worker thread between two checkpoints
const SEEDS_PER_THREAD: usize = 4;
/// Sampling budget per missing CPU target before giving up
const CPU_ATTEMPTS_PER_TARGET: u64 = 1_000;
/// Sampling budget per missing core seed; only reached if hashing is broken
const CORE_ATTEMPTS_PER_SEED: u64 = 10_000;
/// Buckets keep filling up to this multiple of the requested minimum
const CORE_OVERFILL: usize = 2;

/// Counters reported by the `cache` mode of the binary
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub cpu_seeds: usize,
    pub cpu_targets: usize,
    pub core_seeds: usize,
    pub chars_covered: usize,
    pub cpu_iterations: u64,
    pub core_iterations: u64,
    pub reserved_seeds: usize,
    pub cache_file: PathBuf,
    pub file_exists: bool,
}

/// Seed pools backed by a JSON file, plus the reservations of this process
pub struct PuzzleCache {
    path: PathBuf,
    settings: PuzzleSettings,
    pools: RwLock<SeedPools>,
    reservations: ReservationSet,
    /// Serialises writers of the cache file
    writer: Mutex<()>,
    /// Serialises coverage passes
    growth: Mutex<()>,
}

impl PuzzleCache {
    /// Opens the cache at `path`. A missing or unreadable file gives an empty cache;
    /// partitions built under other settings are dropped.
    pub fn load(path: impl Into<PathBuf>, settings: PuzzleSettings) -> Self {
        let path = path.into();
        let pools = match store::read(&path) {
            Ok(Some(file)) => SeedPools::from_file(file, &settings),
            Ok(None) => {
                info!("No puzzle cache at {}, starting empty", path.display());
                SeedPools::empty(&settings)
            }
            Err(e) => {
                warn!("Ignoring unreadable puzzle cache: {}", e);
                SeedPools::empty(&settings)
            }
        };

        Self {
            path,
            settings,
            pools: RwLock::new(pools),
            reservations: ReservationSet::new(),
            writer: Mutex::new(()),
            growth: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &PuzzleSettings {
        &self.settings
    }

    pub fn reservations(&self) -> &ReservationSet {
        &self.reservations
    }

    /// Writes a snapshot of the pools to disk, replacing the old file atomically
    pub fn persist(&self) -> Result<(), CacheError> {
        let _writer = self.writer.lock();
        let file = CacheFile::from_pools(&self.pools.read());
        store::write_atomic(&self.path, &file)
    }

    fn checkpoint(&self) {
        if let Err(e) = self.persist() {
            warn!("Puzzle cache not saved, keeping it in memory only: {}", e);
        }
    }

    /// Makes sure at least `needed` distinct page ids have a CPU seed hashed with
    /// `iterations` rounds. Returns the number of seeds added.
    pub fn ensure_cpu_coverage(&self, needed: usize, iterations: u64) -> Result<usize, CacheError> {
        let _growth = self.growth.lock();
        let id_length = self.settings.id_length;

        let mut invalidated = false;
        let covered = {
            let mut pools = self.pools.write();
            if pools.cpu_iterations != iterations {
                warn!(
                    "CPU seeds were hashed with {} iterations, now {}: discarding {} seeds",
                    pools.cpu_iterations,
                    iterations,
                    pools.cpu.seed_count()
                );
                pools.cpu.clear();
                pools.cpu_iterations = iterations;
                invalidated = true;
            }
            pools.cpu.target_count()
        };
        if covered >= needed {
            if invalidated {
                self.checkpoint();
            }
            return Ok(0);
        }

        let space = space_size(HEX_ALPHABET, id_length);
        if needed as u128 > space {
            return Err(IdSpaceError::Exhausted {
                requested: needed,
                length: id_length,
                space,
            }
            .into());
        }

        info!(
            "Generating CPU seeds: {} of {} targets covered, {} iterations each",
            covered, needed, iterations
        );
        let budget = (needed - covered) as u64 * CPU_ATTEMPTS_PER_TARGET;
        let seed_length = self.settings.seed_length;
        let mut attempts = 0;
        let mut added = 0;
        let mut covered = covered;

        while covered < needed {
            if attempts >= budget {
                self.checkpoint();
                return Err(CacheError::CoverageUnavailable {
                    what: format!("{} CPU targets ({} found)", needed, covered),
                    attempts,
                });
            }

            let batch = self.batch_size(needed - covered);
            let hashed: Vec<(Seed, PageId)> = self
                .sample_seeds(batch, seed_length)
                .into_par_iter()
                .map(|seed| {
                    let target = cpu_target(&seed, iterations, id_length);
                    (seed, target)
                })
                .collect();
            attempts += hashed.len() as u64;

            {
                let mut pools = self.pools.write();
                for (seed, target) in hashed {
                    if pools.cpu.insert(seed, target) {
                        added += 1;
                    }
                }
                covered = pools.cpu.target_count();
            }
            debug!("CPU coverage {}/{}", covered, needed);
            self.checkpoint();
        }

        info!("CPU coverage complete: {} targets, {} new seeds", covered, added);
        Ok(added)
    }

    /// Makes sure every alphabet character has at least `per_char_minimum` core seeds.
    /// Runtime is open-ended: it depends on how often each character comes up.
    pub fn ensure_core_coverage(&self, per_char_minimum: usize) -> Result<usize, CacheError> {
        let _growth = self.growth.lock();
        let iterations = self.settings.core_iterations;
        let ceiling = per_char_minimum * CORE_OVERFILL;

        let missing = {
            let mut pools = self.pools.write();
            if pools.core_iterations != iterations {
                warn!(
                    "Core seeds were hashed with {} iterations, now {}: discarding them",
                    pools.core_iterations, iterations
                );
                pools.core.clear();
                pools.core_iterations = iterations;
            }
            for &symbol in HEX_ALPHABET {
                pools.core.entry(symbol as char).or_default();
            }
            missing_core_seeds(&pools.core, per_char_minimum)
        };
        if missing == 0 {
            return Ok(0);
        }

        info!(
            "Generating core seeds: {} missing, {} iterations each",
            missing, iterations
        );
        let budget = missing as u64 * HEX_ALPHABET.len() as u64 * CORE_ATTEMPTS_PER_SEED;
        let seed_length = self.settings.seed_length;
        let mut attempts = 0;
        let mut added = 0;
        let mut missing = missing;

        while missing > 0 {
            if attempts >= budget {
                self.checkpoint();
                return Err(CacheError::CoverageUnavailable {
                    what: format!("{} core seeds per character", per_char_minimum),
                    attempts,
                });
            }

            let batch = self.batch_size(missing);
            let hashed: Vec<(Seed, Option<char>)> = self
                .sample_seeds(batch, seed_length)
                .into_par_iter()
                .map(|seed| {
                    let symbol = core_target(&seed, iterations);
                    (seed, symbol)
                })
                .collect();
            attempts += hashed.len() as u64;

            {
                let mut pools = self.pools.write();
                for (seed, symbol) in hashed {
                    let Some(bucket) = symbol.and_then(|c| pools.core.get_mut(&c)) else {
                        continue;
                    };
                    if bucket.len() < ceiling && !bucket.contains(&seed) {
                        bucket.push(seed);
                        added += 1;
                    }
                }
                missing = missing_core_seeds(&pools.core, per_char_minimum);
            }
            debug!("Core seeds still missing: {}", missing);
            self.checkpoint();
        }

        info!("Core coverage complete: {} new seeds", added);
        Ok(added)
    }

    fn batch_size(&self, remaining: usize) -> usize {
        let threads = rayon::current_num_threads().max(1);
        remaining.clamp(threads, threads * SEEDS_PER_THREAD)
    }

    fn sample_seeds(&self, count: usize, length: usize) -> Vec<Seed> {
        let mut rng = rand::rng();
        (0..count)
            .map(|_| random_id(HEX_ALPHABET, length, &mut rng))
            .collect()
    }

    /// One seed per target, aligned with `targets`. `None` marks a target with no
    /// seed left to give under the configured [`IssuePolicy`].
    pub fn issue_cpu_seeds(&self, targets: &[PageId]) -> Vec<Option<Seed>> {
        let pools = self.pools.read();
        let mut reserved = self.reservations.lock();
        let mut rng = rand::rng();

        targets
            .iter()
            .map(|target| {
                let seeds = pools.cpu.seeds_for(target);
                if let Some(seed) = seeds.iter().find(|s| !reserved.contains(*s)) {
                    reserved.insert(seed.clone());
                    return Some(seed.clone());
                }
                match self.settings.policy {
                    IssuePolicy::Strict => None,
                    IssuePolicy::Relaxed => seeds.choose(&mut rng).cloned(),
                }
            })
            .collect()
    }

    /// One seed group per target, aligned with `targets`. Seed `i` of a group
    /// hashes to character `i` of the target, left-padded with [`CORE_FILLER`].
    pub fn issue_core_seeds(&self, targets: &[PageId]) -> Vec<Option<Vec<Seed>>> {
        let pools = self.pools.read();
        let mut reserved = self.reservations.lock();
        let mut rng = rand::rng();

        targets
            .iter()
            .map(|target| {
                let padded = self.padded_core_target(target)?;
                let mut group = Vec::with_capacity(padded.len());
                let mut fresh: Vec<Seed> = Vec::new();

                for symbol in padded.chars() {
                    let bucket = pools.core.get(&symbol).map(Vec::as_slice).unwrap_or(&[]);
                    let seed = match bucket.iter().find(|s| !reserved.contains(*s)) {
                        Some(seed) => {
                            reserved.insert(seed.clone());
                            fresh.push(seed.clone());
                            Some(seed.clone())
                        }
                        None if self.settings.policy == IssuePolicy::Relaxed => {
                            bucket.choose(&mut rng).cloned()
                        }
                        None => None,
                    };

                    match seed {
                        Some(seed) => group.push(seed),
                        None => {
                            // Give back what this group took
                            for seed in &fresh {
                                reserved.remove(seed);
                            }
                            return None;
                        }
                    }
                }
                Some(group)
            })
            .collect()
    }

    /// `target` as the sequence of characters its core seeds must hash to
    pub fn padded_core_target(&self, target: &str) -> Option<String> {
        let id_length = self.settings.id_length;
        if target.len() > id_length || !target.bytes().all(|b| HEX_ALPHABET.contains(&b)) {
            return None;
        }
        let mut padded: String = std::iter::repeat_n(CORE_FILLER, id_length - target.len()).collect();
        padded.push_str(target);
        Some(padded)
    }

    pub fn covers_cpu_target(&self, target: &str) -> bool {
        self.pools.read().cpu.covers(target)
    }

    /// Distinct CPU seeds stored for `target`
    pub fn cpu_seed_count(&self, target: &str) -> usize {
        self.pools.read().cpu.seeds_for(target).len()
    }

    /// Page ids with at least one CPU seed, sorted
    pub fn cpu_targets(&self) -> Vec<PageId> {
        let mut targets: Vec<PageId> = self.pools.read().cpu.targets().cloned().collect();
        targets.sort();
        targets
    }

    pub fn cpu_records(&self) -> BTreeMap<Seed, PageId> {
        self.pools.read().cpu.records().clone()
    }

    pub fn core_buckets(&self) -> CoreBuckets {
        self.pools.read().core.clone()
    }

    pub fn cpu_iterations(&self) -> u64 {
        self.pools.read().cpu_iterations
    }

    pub fn core_iterations(&self) -> u64 {
        self.pools.read().core_iterations
    }

    pub fn info(&self) -> CacheInfo {
        let pools = self.pools.read();
        CacheInfo {
            cpu_seeds: pools.cpu.seed_count(),
            cpu_targets: pools.cpu.target_count(),
            core_seeds: pools.core_seed_count(),
            chars_covered: pools.core.values().filter(|s| !s.is_empty()).count(),
            cpu_iterations: pools.cpu_iterations,
            core_iterations: pools.core_iterations,
            reserved_seeds: self.reservations.len(),
            cache_file: self.path.clone(),
            file_exists: self.path.exists(),
        }
    }
}

fn missing_core_seeds(core: &CoreBuckets, per_char_minimum: usize) -> usize {
    HEX_ALPHABET
        .iter()
        .map(|&symbol| {
            let have = core.get(&(symbol as char)).map_or(0, Vec::len);
            per_char_minimum.saturating_sub(have)
        })
        .sum()
}
