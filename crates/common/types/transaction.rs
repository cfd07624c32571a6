use bytes::Bytes;
use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// A historical transaction as stored in the local chain.
///
/// `raw` is the canonical wire encoding and is what gets submitted to the remote ledger. The
/// decoded fields are kept alongside it only to render diagnostics when a submission fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: H256,
    #[serde(with = "crate::serde_utils::bytes")]
    pub raw: Bytes,
    #[serde(with = "crate::serde_utils::u64::hex_str")]
    pub nonce: u64,
    pub gas_price: U256,
    #[serde(with = "crate::serde_utils::u64::hex_str")]
    pub gas_limit: u64,
    #[serde(default)]
    pub to: Option<Address>,
    pub value: U256,
    #[serde(default, with = "crate::serde_utils::bytes")]
    pub data: Bytes,
}

impl Transaction {
    /// Contract creations carry no recipient.
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }

    pub fn raw_hex(&self) -> String {
        hex::encode(&self.raw)
    }

    /// Multi-line rendering used when a submission of this transaction fails.
    pub fn describe(&self) -> String {
        let to = match self.to {
            Some(to) => format!("{to:#x}"),
            None => "contract creation".to_string(),
        };
        format!(
            "tx hash: {:#x}\nraw: 0x{}\nnonce: {}\ngas price: {}\ngas limit: {}\nto: {}\nvalue: {}\ndata: 0x{}",
            self.hash,
            self.raw_hex(),
            self.nonce,
            self.gas_price,
            self.gas_limit,
            to,
            self.value,
            hex::encode(&self.data),
        )
    }
}
