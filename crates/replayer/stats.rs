//! Chain statistics over a located chain.

use evmload_storage::Store;
use serde::Serialize;
use tracing::debug;

use crate::{errors::ReplayError, locator::ChainLocation};

const PROGRESS_INTERVAL: u64 = 100_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainStats {
    /// Blocks in the location, genesis included.
    pub blocks: u64,
    pub empty_blocks: u64,
    pub total_txs: u64,
    /// Transactions without a recipient.
    pub contract_creations: u64,
}

impl ChainStats {
    /// Share of transactions that create contracts, in `[0, 1]`.
    pub fn contract_creation_ratio(&self) -> f64 {
        if self.total_txs == 0 {
            return 0.0;
        }
        self.contract_creations as f64 / self.total_txs as f64
    }
}

pub fn collect(store: &Store, location: &ChainLocation) -> Result<ChainStats, ReplayError> {
    let mut stats = ChainStats::default();
    for (height, hash) in location.hashes().iter().enumerate() {
        let height = height as u64;
        let block = store
            .find_block(height, *hash)?
            .ok_or(ReplayError::ChainGap {
                height,
                hash: *hash,
            })?;

        stats.blocks += 1;
        if block.is_empty() {
            stats.empty_blocks += 1;
        }
        stats.total_txs += block.transactions.len() as u64;
        stats.contract_creations += block
            .transactions
            .iter()
            .filter(|tx| tx.is_contract_creation())
            .count() as u64;

        if height % PROGRESS_INTERVAL == 0 {
            debug!(height, "Collecting chain statistics");
        }
    }
    Ok(stats)
}
