use bytes::Bytes;
use evmload_common::types::Transaction;
use std::fmt;

use crate::{config::Position, errors::ReplayError};

/// Contract methods of the EVM hosted on the remote ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    BeginChain,
    BeginBlock,
    Submit,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::BeginChain => "begin_chain",
            Method::BeginBlock => "begin_block",
            Method::Submit => "submit",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    /// Log-only marker without remote effect.
    Comment,
    Remote {
        method: Method,
        args: Bytes,
        /// The transaction being replayed, for `submit` calls.
        source_tx: Option<Transaction>,
    },
}

/// One unit of work emitted by the generator.
///
/// `block` is `None` for structural entries and for `begin_chain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub block: Option<u64>,
    pub tx: Option<usize>,
    pub comment: String,
    pub kind: CallKind,
}

impl Call {
    pub fn comment(comment: impl Into<String>) -> Self {
        Self {
            block: None,
            tx: None,
            comment: comment.into(),
            kind: CallKind::Comment,
        }
    }

    pub fn remote(
        block: Option<u64>,
        tx: Option<usize>,
        comment: impl Into<String>,
        method: Method,
        args: Bytes,
        source_tx: Option<Transaction>,
    ) -> Self {
        Self {
            block,
            tx,
            comment: comment.into(),
            kind: CallKind::Remote {
                method,
                args,
                source_tx,
            },
        }
    }

    pub fn method(&self) -> Option<Method> {
        match &self.kind {
            CallKind::Remote { method, .. } => Some(*method),
            CallKind::Comment => None,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, CallKind::Comment)
    }
}

/// Terminal marker of a run that stops at a break position.
///
/// Owns the transaction that would have been submitted next, if there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakSignal {
    pub position: Position,
    pub trigger: Option<Transaction>,
}

/// Everything the generator hands to the submission engine, in order.
#[derive(Debug)]
pub enum GeneratorEvent {
    Call(Call),
    /// Last event of a run stopped at a break position.
    Break(BreakSignal),
    /// Last event of a run that cannot continue.
    Fault {
        block: Option<u64>,
        tx: Option<usize>,
        error: ReplayError,
    },
}
