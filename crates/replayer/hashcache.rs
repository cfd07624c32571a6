//! On-disk cache of a located chain: one hex block hash per line, genesis first.

use ethereum_types::H256;
use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::errors::ReplayError;

pub const HASH_CACHE_FILE: &str = "hashcache.txt";
/// Lock file guarding the cache. Kept separate from the cache itself, which gets replaced by
/// rename on every save.
pub const HASH_CACHE_LOCK: &str = "hashcache.lock";

pub fn cache_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(HASH_CACHE_FILE)
}

/// Runs `f` while holding an exclusive advisory lock on the cache directory.
pub fn with_exclusive_lock<T>(
    cache_dir: &Path,
    f: impl FnOnce() -> Result<T, ReplayError>,
) -> Result<T, ReplayError> {
    fs::create_dir_all(cache_dir)?;
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(cache_dir.join(HASH_CACHE_LOCK))?;
    let mut lock = fd_lock::RwLock::new(lock_file);
    let _guard = lock.write()?;
    debug!(dir = %cache_dir.display(), "Acquired hash cache lock");
    f()
}

/// Reads the cached hashes. A missing cache file is not an error.
pub fn load(cache_dir: &Path) -> Result<Option<Vec<H256>>, ReplayError> {
    let path = cache_path(cache_dir);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let hashes = contents
        .lines()
        .enumerate()
        .map(|(index, line)| parse_hash(line).map_err(|reason| corrupt(&path, index + 1, reason)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(hashes))
}

/// Replaces the cache with `hashes`. Readers never observe a partially written file.
pub fn save(cache_dir: &Path, hashes: &[H256]) -> Result<(), ReplayError> {
    fs::create_dir_all(cache_dir)?;
    let path = cache_path(cache_dir);
    let tmp_path = path.with_extension("txt.tmp");

    let mut writer = BufWriter::new(fs::File::create(&tmp_path)?);
    for hash in hashes {
        writeln!(writer, "{}", hex::encode(hash.as_bytes()))?;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    fs::rename(&tmp_path, &path)?;
    debug!(path = %path.display(), entries = hashes.len(), "Saved hash cache");
    Ok(())
}

fn parse_hash(line: &str) -> Result<H256, String> {
    let bytes = hex::decode(line.trim().trim_start_matches("0x")).map_err(|err| err.to_string())?;
    if bytes.len() != 32 {
        return Err(format!("expected 32 bytes, got {}", bytes.len()));
    }
    Ok(H256::from_slice(&bytes))
}

fn corrupt(path: &Path, line: usize, reason: String) -> ReplayError {
    ReplayError::CorruptCache {
        path: path.to_path_buf(),
        line,
        reason,
    }
}
