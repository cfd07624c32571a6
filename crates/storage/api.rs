use ethereum_types::H256;
use evmload_common::types::Block;
use std::fmt::Debug;

use crate::error::StoreError;

/// Read access to an append-only local chain, keyed by block height and hash.
pub trait StoreEngine: Debug + Send + Sync + 'static {
    /// Returns `None` when no block with this `(hash, height)` pair exists.
    fn read_block(&self, hash: H256, height: u64) -> Result<Option<Block>, StoreError>;
}
