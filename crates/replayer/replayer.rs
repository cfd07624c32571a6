//! Replays a historical Ethereum chain against an EVM hosted on a remote ledger.
//!
//! The pipeline runs leaf first:
//! [`locator`] resolves the canonical chain from the local store,
//! [`source`] reads its blocks in order,
//! [`generator`] turns them into remote calls,
//! [`engine`] submits those calls,
//! and [`breakpoint`] snapshots a run that stopped early so it can be resumed.
//! [`pipeline::Replayer`] ties them together.

pub mod breakpoint;
pub mod call;
pub mod config;
pub mod encoding;
pub mod engine;
pub mod errors;
pub mod generator;
pub mod hashcache;
pub mod locator;
pub mod networks;
pub mod pipeline;
pub mod revision;
pub mod source;
pub mod state;
pub mod stats;

pub use config::{Position, ReplayConfig, ReplayOptions};
pub use errors::{EncodingError, ReplayError};
pub use locator::{ChainLocation, locate};
pub use networks::Network;
pub use pipeline::{Replayer, RunReport};
pub use state::RunState;
