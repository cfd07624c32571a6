//! Block Source: reads a located chain from the store in ascending order.

use evmload_common::types::Block;
use evmload_storage::Store;

use crate::{errors::ReplayError, locator::ChainLocation};

/// Genesis state is seeded through `begin_chain`, so replay starts right after it.
pub const FIRST_REPLAYED_BLOCK: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceItem {
    Block { height: u64, block: Block },
    /// A run of consecutive empty blocks withheld under the skip-empty policy.
    SkippedEmpty { first: u64, last: u64 },
}

/// Single-pass iterator over the blocks of a [`ChainLocation`].
///
/// With `skip_empty`, empty blocks are withheld and reported as one [`SourceItem::SkippedEmpty`]
/// right before the next non-empty block, or at the end of the chain.
#[derive(Debug)]
pub struct BlockSource {
    store: Store,
    location: ChainLocation,
    skip_empty: bool,
    next_height: u64,
    skipped: Option<(u64, u64)>,
    held: Option<(u64, Block)>,
    done: bool,
}

impl BlockSource {
    pub fn new(store: Store, location: ChainLocation, skip_empty: bool) -> Self {
        Self {
            store,
            location,
            skip_empty,
            next_height: FIRST_REPLAYED_BLOCK,
            skipped: None,
            held: None,
            done: false,
        }
    }

    fn read(&self, height: u64) -> Result<Block, ReplayError> {
        let hash = self
            .location
            .hash_at(height)
            .ok_or_else(|| ReplayError::Internal(format!("height {height} outside location")))?;
        self.store
            .find_block(height, hash)?
            .ok_or(ReplayError::ChainGap { height, hash })
    }

    fn flush_skipped(&mut self) -> Option<SourceItem> {
        self.skipped
            .take()
            .map(|(first, last)| SourceItem::SkippedEmpty { first, last })
    }
}

impl Iterator for BlockSource {
    type Item = Result<SourceItem, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((height, block)) = self.held.take() {
            return Some(Ok(SourceItem::Block { height, block }));
        }
        if self.done {
            return None;
        }

        loop {
            if self.next_height > self.location.target_height() {
                self.done = true;
                return self.flush_skipped().map(Ok);
            }
            let height = self.next_height;
            self.next_height += 1;

            let block = match self.read(height) {
                Ok(block) => block,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };

            if self.skip_empty && block.is_empty() {
                self.skipped = match self.skipped {
                    Some((first, _)) => Some((first, height)),
                    None => Some((height, height)),
                };
                continue;
            }

            if let Some(skipped) = self.flush_skipped() {
                self.held = Some((height, block));
                return Some(Ok(skipped));
            }
            return Some(Ok(SourceItem::Block { height, block }));
        }
    }
}
