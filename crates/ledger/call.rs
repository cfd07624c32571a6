use bytes::Bytes;

/// A single contract method invocation on the remote ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionCall {
    pub method_name: String,
    pub args: Bytes,
    pub gas: u64,
    pub deposit: u128,
}

impl FunctionCall {
    pub fn new(method_name: impl Into<String>, args: Bytes, gas: u64) -> Self {
        Self {
            method_name: method_name.into(),
            args,
            gas,
            deposit: 0,
        }
    }
}
