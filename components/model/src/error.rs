use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Failed to serialize event")]
    Serialize(#[from] serde_json::Error),

    #[error("Encoded event takes {size} bytes, larger than the block size {block_size}")]
    TooLarge { size: usize, block_size: usize },
}
