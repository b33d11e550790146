//! Storage layer: disk store and write-back block store

pub mod block_store;
pub mod disk;
pub mod error;

pub use block_store::BlockStore;
pub use disk::{AccessStats, DiskStore};
pub use error::{StorageError, StorageResult};
