mod api;
mod backend;
mod store;

pub mod error;
pub use api::StoreEngine;
pub use backend::{dump, in_memory::InMemoryStore};
pub use store::{EngineType, Store};
