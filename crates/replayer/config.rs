use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ReplayError;

/// Remote gas budget of a single unbatched submission.
pub const DEFAULT_GAS: u64 = 800_000_000_000_000;

/// Queue slots per configured batch entry.
pub const QUEUE_CAPACITY_FACTOR: usize = 10;

/// A point in the replayed chain: a block, optionally narrowed to one of its transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub block: u64,
    pub tx: Option<usize>,
}

impl Position {
    pub fn block(block: u64) -> Self {
        Self { block, tx: None }
    }

    pub fn tx(block: u64, tx: usize) -> Self {
        Self {
            block,
            tx: Some(tx),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tx {
            Some(tx) => write!(f, "block {} tx {tx}", self.block),
            None => write!(f, "block {}", self.block),
        }
    }
}

/// Unvalidated run parameters, as collected from the command line.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub gas: u64,
    /// `None` disables batching.
    pub batch_size: Option<usize>,
    pub skip_empty: bool,
    pub start: Option<Position>,
    pub break_at: Option<Position>,
    pub autobreak: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            gas: DEFAULT_GAS,
            batch_size: None,
            skip_empty: false,
            start: None,
            break_at: None,
            autobreak: false,
        }
    }
}

/// Validated, immutable run parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayConfig {
    gas: u64,
    batch_size: Option<usize>,
    skip_empty: bool,
    start: Option<Position>,
    break_at: Option<Position>,
    autobreak: bool,
}

impl ReplayConfig {
    pub fn new(options: ReplayOptions) -> Result<Self, ReplayError> {
        if options.gas == 0 {
            return Err(ReplayError::InvalidArgument(
                "gas budget must be greater than zero".to_string(),
            ));
        }
        if options.batch_size == Some(0) {
            return Err(ReplayError::InvalidArgument(
                "batch size must be at least 1".to_string(),
            ));
        }
        if options.autobreak && options.start.is_some() {
            return Err(ReplayError::ConfigConflict(
                "autobreak cannot be combined with a start position".to_string(),
            ));
        }
        if options.autobreak && options.break_at.is_some() {
            return Err(ReplayError::ConfigConflict(
                "autobreak cannot be combined with a break position".to_string(),
            ));
        }
        if options.start.is_some() && options.break_at.is_some() {
            return Err(ReplayError::ConfigConflict(
                "start and break positions are mutually exclusive".to_string(),
            ));
        }
        if let Some(batch_size) = options.batch_size {
            if options.gas / (batch_size as u64) == 0 {
                return Err(ReplayError::InvalidArgument(format!(
                    "gas budget {} cannot be split across {batch_size} calls",
                    options.gas
                )));
            }
        }

        Ok(Self {
            gas: options.gas,
            batch_size: options.batch_size,
            skip_empty: options.skip_empty,
            // A start block without a tx offset starts at its first transaction.
            start: options.start.map(|start| Position::tx(start.block, start.tx.unwrap_or(0))),
            break_at: options.break_at,
            autobreak: options.autobreak,
        })
    }

    pub fn gas(&self) -> u64 {
        self.gas
    }

    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size
    }

    pub fn skip_empty(&self) -> bool {
        self.skip_empty
    }

    pub fn start(&self) -> Option<Position> {
        self.start
    }

    pub fn break_at(&self) -> Option<Position> {
        self.break_at
    }

    pub fn autobreak(&self) -> bool {
        self.autobreak
    }

    /// Gas attached to each entry of a batch; the whole budget when batching is off.
    pub fn gas_per_call(&self) -> u64 {
        match self.batch_size {
            Some(batch_size) => self.gas / batch_size as u64,
            None => self.gas,
        }
    }

    pub fn queue_capacity(&self) -> usize {
        QUEUE_CAPACITY_FACTOR * self.batch_size.unwrap_or(1)
    }

    /// Configuration of the single automatic retry: same run, stopping before `at`.
    pub(crate) fn autobreak_retry(&self, at: Position) -> Self {
        Self {
            break_at: Some(at),
            autobreak: false,
            ..self.clone()
        }
    }
}
