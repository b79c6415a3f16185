pub mod error;
pub mod memory;
pub mod naming;
pub mod rolling_blob_writer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::Block;
use tokio_util::sync::CancellationToken;

use crate::error::{StorageError, WriteError};

pub use crate::memory::MemoryBlockStore;
pub use crate::naming::{NamingStrategy, PartitionAndDateNamingStrategy};
pub use crate::rolling_blob_writer::RollingBlobWriter;

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

/// Properties of a committed blob as returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobProperties {
    pub name: String,
    pub last_modified: DateTime<Utc>,
    pub length: u64,
    pub etag: String,
}

/// Committed state of a single blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedBlob {
    pub block_ids: Vec<String>,
    pub length: u64,
    pub etag: String,
}

/// Precondition attached to a block list commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessCondition {
    /// The blob must still carry this ETag.
    IfMatch(String),

    /// The blob must not exist yet.
    IfNoneMatchAny,
}

/// Block blob primitives of one storage container.
///
/// Implementations classify every failure into an [`error::ErrorKind`]; callers never inspect
/// transport details.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// List committed blobs whose name starts with `prefix`.
    async fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobProperties>, StorageError>;

    /// Committed block list of a blob, `None` if the blob does not exist.
    async fn get_block_list(&self, name: &str) -> Result<Option<CommittedBlob>, StorageError>;

    /// Stage a block. Staged blocks are invisible until referenced by a block list commit.
    async fn put_block(&self, name: &str, block_id: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Replace the committed block list of a blob. Returns the new ETag.
    async fn put_block_list(
        &self,
        name: &str,
        block_ids: &[String],
        condition: AccessCondition,
    ) -> Result<String, StorageError>;
}

/// Durable sink for sealed blocks.
#[async_trait]
pub trait BlobWriter: Send {
    /// Commit `blocks`, in order, after everything committed before.
    ///
    /// # Returns
    /// * `Ok(true)` - the blocks are durable.
    /// * `Ok(false)` - a storage fault occurred; nothing became visible and the caller keeps the
    ///   blocks for a later attempt.
    /// * `Err(_)` - the batch violates the writer limits, or `token` was cancelled.
    async fn write(
        &mut self,
        blocks: &[&Block],
        token: &CancellationToken,
    ) -> Result<bool, WriteError>;
}
