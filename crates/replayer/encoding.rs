//! Fixed-width wire encoding of `begin_chain` and `begin_block` arguments.
//!
//! Every integer is packed big-endian and right-justified into 32 bytes; values that need more
//! room are rejected rather than truncated.

use borsh::{BorshDeserialize, BorshSerialize};
use bytes::Bytes;
use evmload_common::types::{BlockHeader, Genesis};
use num_bigint::BigUint;

use crate::errors::EncodingError;

pub const U256_WIDTH: usize = 32;

pub type RawU256 = [u8; U256_WIDTH];
pub type RawAddress = [u8; 20];
pub type RawH256 = [u8; 32];

pub fn pack_u256(value: &BigUint) -> Result<RawU256, EncodingError> {
    let bytes = value.to_bytes_be();
    if bytes.len() > U256_WIDTH {
        return Err(EncodingError::OutOfRange {
            value: value.to_string(),
            width: U256_WIDTH,
        });
    }
    let mut raw = [0u8; U256_WIDTH];
    raw[U256_WIDTH - bytes.len()..].copy_from_slice(&bytes);
    Ok(raw)
}

pub fn pack_u64(value: u64) -> RawU256 {
    let mut raw = [0u8; U256_WIDTH];
    raw[U256_WIDTH - 8..].copy_from_slice(&value.to_be_bytes());
    raw
}

pub fn unpack_u256(raw: &RawU256) -> BigUint {
    BigUint::from_bytes_be(raw)
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccountBalance {
    pub account: RawAddress,
    pub balance: RawU256,
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct BeginChainArgs {
    pub chain_id: RawU256,
    pub genesis_alloc: Vec<AccountBalance>,
}

impl BeginChainArgs {
    /// Fails on the first balance that does not fit the wire width.
    pub fn new(chain_id: u64, genesis: &Genesis) -> Result<Self, EncodingError> {
        let genesis_alloc = genesis
            .sorted_accounts()
            .map(|(address, balance)| {
                Ok(AccountBalance {
                    account: address.0,
                    balance: pack_u256(balance)?,
                })
            })
            .collect::<Result<Vec<_>, EncodingError>>()?;
        Ok(Self {
            chain_id: pack_u64(chain_id),
            genesis_alloc,
        })
    }

    pub fn encode(&self) -> Result<Bytes, EncodingError> {
        to_bytes("begin_chain", self)
    }
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct BeginBlockArgs {
    pub hash: RawH256,
    pub coinbase: RawAddress,
    pub timestamp: RawU256,
    pub number: RawU256,
    pub difficulty: RawU256,
    pub gaslimit: RawU256,
}

impl BeginBlockArgs {
    pub fn new(header: &BlockHeader) -> Result<Self, EncodingError> {
        Ok(Self {
            hash: header.hash.0,
            coinbase: header.coinbase.0,
            timestamp: pack_u64(header.timestamp),
            number: pack_u64(header.number),
            difficulty: pack_u256(&header.difficulty)?,
            gaslimit: pack_u64(header.gas_limit),
        })
    }

    pub fn encode(&self) -> Result<Bytes, EncodingError> {
        to_bytes("begin_block", self)
    }
}

fn to_bytes<T: BorshSerialize>(method: &'static str, value: &T) -> Result<Bytes, EncodingError> {
    borsh::to_vec(value)
        .map(Bytes::from)
        .map_err(|err| EncodingError::Serialize {
            method,
            reason: err.to_string(),
        })
}
