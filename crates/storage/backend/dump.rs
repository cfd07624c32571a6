//! Dump files: one JSON encoded [`Block`] per line in ascending height, snappy framed.
//!
//! A dump is the portable form of a located chain. It is produced from any [`Store`] along an
//! ordered list of block hashes and loaded back as a read-only in-memory engine.

use ethereum_types::H256;
use evmload_common::types::Block;
use snap::{read::FrameDecoder, write::FrameEncoder};
use std::{
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use crate::{Store, backend::in_memory::InMemoryStore, error::StoreError};

/// Loads every block of the dump at `path`.
pub fn load(path: &Path) -> Result<InMemoryStore, StoreError> {
    let file = File::open(path)?;
    let reader = BufReader::new(FrameDecoder::new(BufReader::new(file)));
    let store = InMemoryStore::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let block: Block = serde_json::from_str(&line).map_err(|source| StoreError::Decode {
            line: index + 1,
            source,
        })?;
        store.add_block(block)?;
    }

    info!(path = %path.display(), blocks = store.len()?, "Loaded chain dump");
    Ok(store)
}

/// Writes the blocks identified by `hashes` (index = height) to a new dump at `path`.
///
/// Fails with [`StoreError::AlreadyExists`] instead of overwriting an existing file. Blocks are
/// written to `<path>.tmp` first, so a failed export leaves nothing at `path`.
pub fn write_dump(store: &Store, hashes: &[H256], path: &Path) -> Result<usize, StoreError> {
    if path.exists() {
        return Err(StoreError::AlreadyExists(path.to_path_buf()));
    }
    let tmp_path = tmp_path(path);

    if let Err(err) = write_blocks(store, hashes, &tmp_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    fs::rename(&tmp_path, path)?;

    info!(path = %path.display(), blocks = hashes.len(), "Wrote chain dump");
    Ok(hashes.len())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn write_blocks(store: &Store, hashes: &[H256], path: &Path) -> Result<(), StoreError> {
    let mut writer = FrameEncoder::new(BufWriter::new(File::create(path)?));

    for (height, hash) in hashes.iter().enumerate() {
        let height = height as u64;
        let block = store.get_block(height, *hash)?;
        serde_json::to_writer(&mut writer, &block)
            .map_err(|source| StoreError::Encode { height, source })?;
        writer.write_all(b"\n")?;
        if height % 10_000 == 0 {
            debug!(height, "Dumping blocks");
        }
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreEngine;
    use ethereum_types::Address;
    use evmload_common::{BigUint, types::BlockHeader};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn chain(len: u64) -> (InMemoryStore, Vec<H256>) {
        let store = InMemoryStore::new();
        let mut hashes = Vec::new();
        let mut parent_hash = H256::zero();
        for number in 0..len {
            let hash = H256::from_low_u64_be(number + 100);
            store
                .add_block(Block::new(
                    BlockHeader {
                        hash,
                        parent_hash,
                        coinbase: Address::from_low_u64_be(number),
                        difficulty: BigUint::from(number + 1),
                        number,
                        gas_limit: 8_000_000,
                        timestamp: 1_000 + number,
                    },
                    vec![],
                ))
                .unwrap();
            hashes.push(hash);
            parent_hash = hash;
        }
        (store, hashes)
    }

    #[test]
    fn dump_round_trips_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.dump");
        let (memory, hashes) = chain(4);
        let store = Store::from_engine(Arc::new(memory.clone()));

        assert_eq!(write_dump(&store, &hashes, &path).unwrap(), 4);

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len().unwrap(), 4);
        for (height, hash) in hashes.iter().enumerate() {
            assert_eq!(
                loaded.read_block(*hash, height as u64).unwrap(),
                memory.read_block(*hash, height as u64).unwrap()
            );
        }
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.dump");
        std::fs::write(&path, b"keep me").unwrap();
        let (memory, hashes) = chain(1);
        let store = Store::from_engine(Arc::new(memory));

        let err = write_dump(&store, &hashes, &path).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
    }

    #[test]
    fn failed_export_leaves_no_partial_dump() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chain.dump");
        let (memory, mut hashes) = chain(2);
        let missing = H256::repeat_byte(0xee);
        hashes.push(missing);
        let store = Store::from_engine(Arc::new(memory.clone()));

        let err = write_dump(&store, &hashes, &path).unwrap_err();
        assert!(matches!(err, StoreError::BlockNotFound { height: 2, .. }));
        assert!(!path.exists());
        assert!(!dir.path().join("chain.dump.tmp").exists());

        // Once the block shows up, the same export succeeds.
        memory
            .add_block(Block::new(
                BlockHeader {
                    hash: missing,
                    parent_hash: hashes[1],
                    coinbase: Address::zero(),
                    difficulty: BigUint::from(3u64),
                    number: 2,
                    gas_limit: 8_000_000,
                    timestamp: 1_002,
                },
                vec![],
            ))
            .unwrap();
        assert_eq!(write_dump(&store, &hashes, &path).unwrap(), 3);
        assert_eq!(load(&path).unwrap().len().unwrap(), 3);
    }
}
