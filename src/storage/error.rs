use thiserror::Error;

use crate::constants::BLOCK_SIZE;

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Block not found: {0}")]
    BlockNotFound(u64),

    #[error(
        "Write exceeds block size: offset {} + length {} > {}",
        .offset,
        .length,
        BLOCK_SIZE
    )]
    ExceedsBlockSize { offset: u64, length: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;
