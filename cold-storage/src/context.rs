use std::collections::HashMap;

use async_trait::async_trait;
use model::EventData;
use parking_lot::Mutex;

use crate::error::CheckpointError;

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

/// What the lease host exposes about the partition a processor owns.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait PartitionContext: Send + Sync {
    fn partition_id(&self) -> String;

    /// Record that everything up to and including `event` is durable. Must be idempotent.
    async fn checkpoint(&self, event: &EventData) -> Result<(), CheckpointError>;
}

/// Checkpoints kept in process memory, keyed by partition.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    offsets: Mutex<HashMap<String, String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self, partition_id: &str) -> Option<String> {
        self.offsets.lock().get(partition_id).cloned()
    }

    pub fn context(&self, partition_id: impl Into<String>) -> MemoryPartitionContext<'_> {
        MemoryPartitionContext {
            partition_id: partition_id.into(),
            store: self,
        }
    }
}

pub struct MemoryPartitionContext<'a> {
    partition_id: String,
    store: &'a MemoryCheckpointStore,
}

#[async_trait]
impl PartitionContext for MemoryPartitionContext<'_> {
    fn partition_id(&self) -> String {
        self.partition_id.clone()
    }

    async fn checkpoint(&self, event: &EventData) -> Result<(), CheckpointError> {
        self.store
            .offsets
            .lock()
            .insert(self.partition_id.clone(), event.offset.clone());
        Ok(())
    }
}
