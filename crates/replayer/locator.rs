//! Chain Locator: resolves the canonical list of block hashes from genesis to a target block.

use ethereum_types::H256;
use evmload_storage::Store;
use std::{path::Path, sync::Arc};
use tracing::{debug, info, warn};

use crate::{errors::ReplayError, hashcache};

/// Walk progress is logged every this many blocks.
const PROGRESS_INTERVAL: u64 = 100_000;

/// Canonical block hashes from genesis (index 0) to the target block.
///
/// `hashes[h]` is the parent of `hashes[h + 1]`. Cloning is cheap, so one location can back
/// several runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLocation {
    hashes: Arc<[H256]>,
}

impl ChainLocation {
    pub fn new(hashes: Vec<H256>) -> Result<Self, ReplayError> {
        if hashes.is_empty() {
            return Err(ReplayError::InvalidArgument(
                "chain location needs at least the genesis block".to_string(),
            ));
        }
        Ok(Self {
            hashes: hashes.into(),
        })
    }

    pub fn target_height(&self) -> u64 {
        (self.hashes.len() - 1) as u64
    }

    pub fn target_hash(&self) -> H256 {
        self.hashes[self.hashes.len() - 1]
    }

    pub fn hash_at(&self, height: u64) -> Option<H256> {
        usize::try_from(height)
            .ok()
            .and_then(|index| self.hashes.get(index))
            .copied()
    }

    pub fn hashes(&self) -> &[H256] {
        &self.hashes
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Resolves the chain ending at `(target_height, target_hash)`.
///
/// A cache at `cache_dir` that covers the target is used without touching the store. Otherwise,
/// or when the cache cannot be parsed, the store is walked back to genesis and the cache is
/// rewritten. The whole operation holds the
/// cache lock.
pub fn locate(
    store: &Store,
    cache_dir: &Path,
    target_height: u64,
    target_hash: H256,
) -> Result<ChainLocation, ReplayError> {
    hashcache::with_exclusive_lock(cache_dir, || {
        let len = usize::try_from(target_height)
            .ok()
            .and_then(|height| height.checked_add(1))
            .ok_or_else(|| {
                ReplayError::InvalidArgument(format!("target height {target_height} too large"))
            })?;

        let cached = match hashcache::load(cache_dir) {
            Ok(cached) => cached,
            Err(err @ ReplayError::CorruptCache { .. }) => {
                warn!(%err, "Discarding unreadable hash cache");
                None
            }
            Err(err) => return Err(err),
        };
        if let Some(mut cached) = cached {
            if cached.len() >= len && cached[len - 1] == target_hash {
                cached.truncate(len);
                info!(height = target_height, "Hash cache hit");
                return ChainLocation::new(cached);
            }
            debug!(
                cached = cached.len(),
                height = target_height,
                "Hash cache does not cover target"
            );
        }

        info!(height = target_height, hash = ?target_hash, "Hash cache miss, walking chain");
        let hashes = traverse(store, target_height, target_hash)?;
        hashcache::save(cache_dir, &hashes)?;
        ChainLocation::new(hashes)
    })
}

/// Walks parent links from the target down to genesis.
fn traverse(
    store: &Store,
    target_height: u64,
    target_hash: H256,
) -> Result<Vec<H256>, ReplayError> {
    let target = store
        .find_block(target_height, target_hash)?
        .ok_or(ReplayError::TargetNotFound {
            height: target_height,
            hash: target_hash,
        })?;

    let mut hashes = Vec::with_capacity(usize::try_from(target_height).unwrap_or(0) + 1);
    let mut parent_hash = target.parent_hash();
    let mut height = target_height;
    while height > 0 {
        height -= 1;
        let block = store
            .find_block(height, parent_hash)?
            .ok_or(ReplayError::ChainGap {
                height,
                hash: parent_hash,
            })?;
        hashes.push(parent_hash);
        parent_hash = block.parent_hash();
        if height % PROGRESS_INTERVAL == 0 {
            debug!(height, "Walking chain");
        }
    }

    hashes.reverse();
    hashes.push(target_hash);
    Ok(hashes)
}
