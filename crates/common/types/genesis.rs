use ethereum_types::Address;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io::BufReader, path::Path};

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: u64,
}

/// The subset of a genesis file that seeds the remote ledger through `begin_chain`.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Genesis {
    pub config: ChainConfig,
    /// Kept ordered so every run enumerates the allocation identically.
    #[serde(default)]
    pub alloc: BTreeMap<Address, GenesisAccount>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct GenesisAccount {
    #[serde(default, with = "crate::serde_utils::biguint")]
    pub balance: BigUint,
}

#[derive(Debug, thiserror::Error)]
pub enum GenesisError {
    #[error("Failed to decode genesis file: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Failed to open genesis file: {0}")]
    File(#[from] std::io::Error),
}

impl TryFrom<&Path> for Genesis {
    type Error = GenesisError;

    fn try_from(genesis_file_path: &Path) -> Result<Self, Self::Error> {
        let genesis_file = std::fs::File::open(genesis_file_path)?;
        let genesis_reader = BufReader::new(genesis_file);
        let genesis: Genesis = serde_json::from_reader(genesis_reader)?;
        tracing::debug!(
            path = %genesis_file_path.display(),
            accounts = genesis.alloc.len(),
            "Loaded genesis"
        );
        Ok(genesis)
    }
}

impl Genesis {
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Allocated accounts in ascending address order.
    pub fn sorted_accounts(&self) -> impl Iterator<Item = (&Address, &BigUint)> {
        self.alloc
            .iter()
            .map(|(address, account)| (address, &account.balance))
    }
}
