use std::sync::Arc;

use log::info;
use object_storage::BlobWriter;
use tokio_util::sync::CancellationToken;
use util::BufferPool;

use crate::processor::{PartitionProcessor, WriterFactory};

/// Settings shared by the processors of every partition of one event hub.
pub struct ColdStorageProcessorFactory<W> {
    writer_factory: WriterFactory<W>,
    breaker: config::CircuitBreaker,
    event_hub: String,
    block_size: usize,
    buffers: Arc<BufferPool>,
    token: CancellationToken,
}

impl<W> ColdStorageProcessorFactory<W>
where
    W: BlobWriter,
{
    pub fn new(
        writer_factory: WriterFactory<W>,
        breaker: config::CircuitBreaker,
        event_hub: impl Into<String>,
        block_size: usize,
        token: CancellationToken,
    ) -> Self {
        Self {
            writer_factory,
            breaker,
            event_hub: event_hub.into(),
            block_size,
            buffers: Arc::new(BufferPool::default()),
            token,
        }
    }

    pub fn create_processor(&self) -> PartitionProcessor<W> {
        info!("Creating a processor for event hub {}", self.event_hub);
        PartitionProcessor::new(
            Arc::clone(&self.writer_factory),
            &self.breaker,
            self.event_hub.clone(),
            self.block_size,
            Arc::clone(&self.buffers),
            self.token.clone(),
        )
    }

    pub fn buffers(&self) -> &Arc<BufferPool> {
        &self.buffers
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
