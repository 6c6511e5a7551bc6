use std::collections::{BTreeMap, HashMap};

use log2::{info, warn};

use super::store::CacheFile;
use super::{PuzzleSettings, Seed};
use crate::graph::PageId;
use crate::id_space::HEX_ALPHABET;

/// CPU partition: every recorded seed and the page id it hashes to
#[derive(Debug, Clone, Default)]
pub struct CpuPool {
    by_seed: BTreeMap<Seed, PageId>,
    by_target: HashMap<PageId, Vec<Seed>>,
}

impl CpuPool {
    /// Records `seed`, returns false if it was already known
    pub fn insert(&mut self, seed: Seed, target: PageId) -> bool {
        if self.by_seed.contains_key(&seed) {
            return false;
        }
        self.by_target.entry(target.clone()).or_default().push(seed.clone());
        self.by_seed.insert(seed, target);
        true
    }

    pub fn seeds_for(&self, target: &str) -> &[Seed] {
        self.by_target.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn covers(&self, target: &str) -> bool {
        self.by_target.contains_key(target)
    }

    pub fn target_count(&self) -> usize {
        self.by_target.len()
    }

    pub fn seed_count(&self) -> usize {
        self.by_seed.len()
    }

    pub fn targets(&self) -> impl Iterator<Item = &PageId> {
        self.by_target.keys()
    }

    pub fn records(&self) -> &BTreeMap<Seed, PageId> {
        &self.by_seed
    }

    pub fn clear(&mut self) {
        self.by_seed.clear();
        self.by_target.clear();
    }
}

/// Core partition: seeds bucketed by the character they hash to
pub type CoreBuckets = BTreeMap<char, Vec<Seed>>;

/// In-memory form of the cache file
#[derive(Debug, Clone)]
pub struct SeedPools {
    pub cpu: CpuPool,
    pub core: CoreBuckets,
    pub cpu_iterations: u64,
    pub core_iterations: u64,
    pub id_length: usize,
}

impl SeedPools {
    pub fn empty(settings: &PuzzleSettings) -> Self {
        Self {
            cpu: CpuPool::default(),
            core: CoreBuckets::new(),
            cpu_iterations: settings.cpu_iterations,
            core_iterations: settings.core_iterations,
            id_length: settings.id_length,
        }
    }

    /// Keeps the partitions of `file` that were built under `settings`, drops the rest
    pub fn from_file(file: CacheFile, settings: &PuzzleSettings) -> Self {
        let mut pools = Self::empty(settings);

        let cpu_reusable = match (file.id_length, file.cpu_iterations) {
            (Some(length), _) if length != settings.id_length => {
                warn!(
                    "Cache was built for ids of length {}, expected {}: dropping {} CPU seeds",
                    length,
                    settings.id_length,
                    file.cpu_seeds.len()
                );
                false
            }
            (_, Some(cost)) if cost == settings.cpu_iterations => true,
            (_, cost) => {
                if !file.cpu_seeds.is_empty() {
                    warn!(
                        "CPU seeds were hashed with {:?} iterations, expected {}: regenerating",
                        cost, settings.cpu_iterations
                    );
                }
                false
            }
        };
        if cpu_reusable {
            for (seed, target) in file.cpu_seeds {
                if target.len() == settings.id_length {
                    pools.cpu.insert(seed, target);
                }
            }
        }

        if file.core_iterations != Some(settings.core_iterations) {
            if !file.core_seeds.is_empty() {
                warn!(
                    "Core seeds were hashed with {:?} iterations, expected {}: regenerating",
                    file.core_iterations, settings.core_iterations
                );
            }
        } else if file.core_seeds.keys().any(|k| !is_bucket_key(k)) {
            warn!("Old core_seeds format detected, will regenerate");
        } else {
            for (key, seeds) in file.core_seeds {
                if let Some(ch) = key.chars().next() {
                    pools.core.insert(ch, seeds);
                }
            }
        }

        info!(
            "Loaded {} CPU seeds covering {} targets and {} core seeds",
            pools.cpu.seed_count(),
            pools.cpu.target_count(),
            pools.core_seed_count()
        );
        pools
    }

    pub fn core_seed_count(&self) -> usize {
        self.core.values().map(Vec::len).sum()
    }
}

fn is_bucket_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii() && HEX_ALPHABET.contains(&(c as u8)))
}
