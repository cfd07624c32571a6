use ethereum_types::H256;
use hex_literal::hex;
use std::{fmt, str::FromStr};

use crate::errors::ReplayError;

/// Block the replay runs up to, identified by height and hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTarget {
    pub height: u64,
    pub hash: H256,
}

/// Default replay target of a public testnet.
#[derive(Debug, Clone, Copy)]
struct NetworkParams {
    name: &'static str,
    chain_id: u64,
    default_target: ChainTarget,
}

const GOERLI: NetworkParams = NetworkParams {
    name: "goerli",
    chain_id: 5,
    default_target: ChainTarget {
        height: 4_747_554,
        hash: H256(hex!(
            "ca3f0a8bcbfadf60994423da4009b9519ccab6e1e91c637888d313ecf24f0a1a"
        )),
    },
};

const RINKEBY: NetworkParams = NetworkParams {
    name: "rinkeby",
    chain_id: 4,
    default_target: ChainTarget {
        height: 8_541_193,
        hash: H256(hex!(
            "9afd56145c5a771967b0d86800338694214e9c83d9d89d52215d916b555d9cd5"
        )),
    },
};

const ROPSTEN: NetworkParams = NetworkParams {
    name: "ropsten",
    chain_id: 3,
    default_target: ChainTarget {
        height: 10_187_164,
        hash: H256(hex!(
            "000f6b7fc929f6f3a493cad3cee9d65274e51228a05970cf03ad7fb6664007a6"
        )),
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Goerli,
    Rinkeby,
    Ropsten,
    /// Any other chain; has no default target.
    Custom { chain_id: u64 },
}

impl Network {
    fn params(&self) -> Option<&'static NetworkParams> {
        match self {
            Network::Goerli => Some(&GOERLI),
            Network::Rinkeby => Some(&RINKEBY),
            Network::Ropsten => Some(&ROPSTEN),
            Network::Custom { .. } => None,
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Self {
        [Network::Goerli, Network::Rinkeby, Network::Ropsten]
            .into_iter()
            .find(|network| network.chain_id() == chain_id)
            .unwrap_or(Network::Custom { chain_id })
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Custom { chain_id } => *chain_id,
            known => known.params().map_or(0, |params| params.chain_id),
        }
    }

    pub fn default_target(&self) -> Option<ChainTarget> {
        self.params().map(|params| params.default_target)
    }

    /// Resolves the replay target, falling back to the network default when neither part of the
    /// target was given.
    pub fn resolve_target(
        &self,
        height: Option<u64>,
        hash: Option<H256>,
    ) -> Result<ChainTarget, ReplayError> {
        match (height, hash) {
            (Some(height), Some(hash)) => Ok(ChainTarget { height, hash }),
            (None, None) => self.default_target().ok_or_else(|| {
                ReplayError::InvalidArgument(format!(
                    "network {self} has no default target, --block and --hash are required"
                ))
            }),
            _ => Err(ReplayError::InvalidArgument(
                "--block and --hash must be given together".to_string(),
            )),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Custom { chain_id } => write!(f, "chain-{chain_id}"),
            known => write!(f, "{}", known.params().map_or("unknown", |params| params.name)),
        }
    }
}

impl FromStr for Network {
    type Err = ReplayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "goerli" => Ok(Network::Goerli),
            "rinkeby" => Ok(Network::Rinkeby),
            "ropsten" => Ok(Network::Ropsten),
            other => Err(ReplayError::InvalidArgument(format!(
                "unknown network {other}, expected goerli, rinkeby or ropsten"
            ))),
        }
    }
}
