use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::CacheError;
use super::Seed;
use super::pool::SeedPools;
use crate::graph::PageId;

/// On-disk layout of the puzzle cache. Unknown fields are ignored on read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheFile {
    /// seed -> page id it hashes to
    #[serde(default)]
    pub cpu_seeds: BTreeMap<Seed, PageId>,
    /// character -> seeds hashing to it
    #[serde(default)]
    pub core_seeds: BTreeMap<String, Vec<Seed>>,
    #[serde(default)]
    pub cpu_iterations: Option<u64>,
    #[serde(default)]
    pub core_iterations: Option<u64>,
    #[serde(default, alias = "page_id_length")]
    pub id_length: Option<usize>,
    #[serde(default)]
    pub generated_at: f64,
    #[serde(default)]
    pub total_cpu_seeds: usize,
    #[serde(default)]
    pub total_core_seeds: usize,
}

impl CacheFile {
    pub fn from_pools(pools: &SeedPools) -> Self {
        Self {
            cpu_seeds: pools.cpu.records().clone(),
            core_seeds: pools
                .core
                .iter()
                .map(|(ch, seeds)| (ch.to_string(), seeds.clone()))
                .collect(),
            cpu_iterations: Some(pools.cpu_iterations),
            core_iterations: Some(pools.core_iterations),
            id_length: Some(pools.id_length),
            generated_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default(),
            total_cpu_seeds: pools.cpu.seed_count(),
            total_core_seeds: pools.core_seed_count(),
        }
    }
}

/// Reads the cache file, `Ok(None)` if there is none yet
pub fn read(path: &Path) -> Result<Option<CacheFile>, CacheError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CacheError::Persistence {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Writes `file` next to `path` and renames it into place
pub fn write_atomic(path: &Path, file: &CacheFile) -> Result<(), CacheError> {
    let bytes = serde_json::to_vec_pretty(file)?;
    let tmp_path = temp_path(path);
    let io_err = |source| CacheError::Persistence {
        path: tmp_path.clone(),
        source,
    };

    {
        let mut out = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(io_err)?;
        out.write_all(&bytes).map_err(io_err)?;
        out.sync_all().map_err(io_err)?;
    }

    fs::rename(&tmp_path, path).map_err(|source| CacheError::Persistence {
        path: path.to_path_buf(),
        source,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashcache.json");
        let mut file = CacheFile::default();
        file.cpu_seeds.insert("0011223344556677".into(), "ab12".into());
        file.core_seeds.insert("f".into(), vec!["ffffffffffffffff".into()]);
        file.id_length = Some(4);

        write_atomic(&path, &file).unwrap();
        assert_eq!(read(&path).unwrap(), Some(file));
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_legacy_fields_and_extra_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashcache.json");
        fs::write(
            &path,
            r#"{"cpu_seeds": {}, "core_seeds": {"a": ["x"]}, "page_id_length": 6,
                "cpu_iterations": 10, "comment": "added later"}"#,
        )
        .unwrap();

        let file = read(&path).unwrap().unwrap();
        assert_eq!(file.id_length, Some(6));
        assert_eq!(file.cpu_iterations, Some(10));
        assert_eq!(file.core_iterations, None);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hashcache.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(read(&path), Err(CacheError::Serialization(_))));
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/hashcache.json");
        assert!(matches!(
            write_atomic(&path, &CacheFile::default()),
            Err(CacheError::Persistence { .. })
        ));
    }
}
