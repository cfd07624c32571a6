mod block;
mod genesis;
mod transaction;

pub use block::*;
pub use genesis::*;
pub use transaction::*;
