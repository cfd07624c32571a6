use ethereum_types::H256;
use evmload_common::types::Block;
use std::{path::Path, sync::Arc};
use tracing::info;

use crate::{
    api::StoreEngine,
    backend::{dump, in_memory::InMemoryStore},
    error::StoreError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    InMemory,
    /// Read-only engine backed by a snappy-framed dump file.
    Dump,
}

#[derive(Debug, Clone)]
pub struct Store {
    engine: Arc<dyn StoreEngine>,
}

impl Store {
    pub fn new(path: impl AsRef<Path>, engine_type: EngineType) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("Starting storage engine ({engine_type:?})");
        let engine: Arc<dyn StoreEngine> = match engine_type {
            EngineType::InMemory => Arc::new(InMemoryStore::new()),
            EngineType::Dump => Arc::new(dump::load(path)?),
        };
        Ok(Self { engine })
    }

    pub fn from_engine(engine: Arc<dyn StoreEngine>) -> Self {
        Self { engine }
    }

    pub fn find_block(&self, height: u64, hash: H256) -> Result<Option<Block>, StoreError> {
        self.engine.read_block(hash, height)
    }

    /// Like [`Store::find_block`], but a missing block is an error.
    pub fn get_block(&self, height: u64, hash: H256) -> Result<Block, StoreError> {
        self.find_block(height, hash)?
            .ok_or(StoreError::BlockNotFound { height, hash })
    }
}
