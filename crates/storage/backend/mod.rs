pub mod dump;
pub mod in_memory;
