use ethereum_types::H256;
use evmload_common::types::Block;
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{api::StoreEngine, error::StoreError};

type Blocks = HashMap<(u64, H256), Block>;

#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Blocks>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&self, block: Block) -> Result<(), StoreError> {
        let mut blocks = self.inner.write().map_err(|_| StoreError::LockError)?;
        blocks.insert((block.number(), block.hash()), block);
        Ok(())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().map_err(|_| StoreError::LockError)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl StoreEngine for InMemoryStore {
    fn read_block(&self, hash: H256, height: u64) -> Result<Option<Block>, StoreError> {
        let blocks = self.inner.read().map_err(|_| StoreError::LockError)?;
        Ok(blocks.get(&(height, hash)).cloned())
    }
}
