use ethereum_types::{Address, H256};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use super::Transaction;

/// Header fields needed to rebuild the execution context of a historical block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub hash: H256,
    pub parent_hash: H256,
    #[serde(alias = "miner")]
    pub coinbase: Address,
    #[serde(with = "crate::serde_utils::biguint")]
    pub difficulty: BigUint,
    #[serde(with = "crate::serde_utils::u64::hex_str")]
    pub number: u64,
    #[serde(with = "crate::serde_utils::u64::hex_str")]
    pub gas_limit: u64,
    #[serde(with = "crate::serde_utils::u64::hex_str")]
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    pub fn hash(&self) -> H256 {
        self.header.hash
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn parent_hash(&self) -> H256 {
        self.header.parent_hash
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
