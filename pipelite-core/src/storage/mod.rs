// src/storage/mod.rs
// Document sources the pipeline reads from

mod memory_storage;
mod traits;

pub use memory_storage::MemoryStorage;
pub use traits::DocumentSource;
