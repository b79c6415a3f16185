use std::sync::Arc;

use async_trait::async_trait;
use config::error::ConfigurationError;
use log::{debug, error, info, warn};
use model::{error::EncodeError, Block, BufferedFrame, EventData};
use object_storage::BlobWriter;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use util::BufferPool;

use crate::{
    circuit_breaker::{CircuitBreaker, Verdict},
    context::PartitionContext,
    error::ProcessorError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Orderly stop. Buffered events are written and checkpointed once more.
    Shutdown,

    /// Another owner took over the partition. Buffered events are dropped; the new owner
    /// resumes from the last checkpoint.
    LeaseLost,
}

/// Callbacks the lease host invokes, serially, for one partition.
#[async_trait]
pub trait EventProcessor: Send {
    async fn open(&mut self, context: &dyn PartitionContext) -> Result<(), ProcessorError>;

    /// An empty batch means the receive timeout elapsed without events.
    async fn process_events(
        &mut self,
        context: &dyn PartitionContext,
        events: &[EventData],
    ) -> Result<(), ProcessorError>;

    async fn close(
        &mut self,
        context: &dyn PartitionContext,
        reason: CloseReason,
    ) -> Result<(), ProcessorError>;
}

pub type WriterFactory<W> = Arc<dyn Fn(&str) -> Result<W, ConfigurationError> + Send + Sync>;

/// Buffers the events of one partition into blocks and hands sealed blocks to a blob writer,
/// checkpointing once they are durable.
///
/// Sealed blocks the writer has not accepted yet stay pending and are offered again, unchanged,
/// on the next flush. A circuit breaker on the number of pending blocks stalls intake while the
/// writer keeps failing.
pub struct PartitionProcessor<W> {
    log_ident: String,
    event_hub: String,
    writer_factory: WriterFactory<W>,
    writer: Option<W>,
    buffers: Arc<BufferPool>,
    block_size: usize,
    current: Option<Block>,
    last_event: Option<EventData>,
    pending: Vec<BufferedFrame>,
    breaker: CircuitBreaker,
    token: CancellationToken,
}

impl<W> PartitionProcessor<W>
where
    W: BlobWriter,
{
    pub fn new(
        writer_factory: WriterFactory<W>,
        breaker: &config::CircuitBreaker,
        event_hub: impl Into<String>,
        block_size: usize,
        buffers: Arc<BufferPool>,
        token: CancellationToken,
    ) -> Self {
        let event_hub = event_hub.into();
        let log_ident = format!("Processor[{event_hub}] ");
        Self {
            breaker: CircuitBreaker::new(log_ident.clone(), breaker),
            log_ident,
            event_hub,
            writer_factory,
            writer: None,
            buffers,
            block_size,
            current: None,
            last_event: None,
            pending: vec![],
            token,
        }
    }

    /// Number of sealed blocks waiting to be written.
    pub fn pending_blocks(&self) -> usize {
        self.pending.len()
    }

    /// Bytes buffered in the block currently being filled.
    pub fn buffered_bytes(&self) -> usize {
        self.current.as_ref().map_or(0, Block::len)
    }

    fn ensure_open(&self) -> Result<(), ProcessorError> {
        if self.writer.is_none() {
            return Err(ProcessorError::NotOpened);
        }
        Ok(())
    }

    fn rent_block(&self) -> Block {
        Block::new(self.buffers.rent(self.block_size))
    }

    fn encode(&self, event: &EventData) -> Result<Vec<u8>, EncodeError> {
        let bytes = event.encode()?;
        if bytes.len() > self.block_size {
            return Err(EncodeError::TooLarge {
                size: bytes.len(),
                block_size: self.block_size,
            });
        }
        Ok(bytes)
    }

    /// Move a non-empty current block to the pending list, renting a fresh one if
    /// `rent_next`.
    fn seal_current(&mut self, rent_next: bool) {
        let block = match self.current.take() {
            Some(block) if !block.is_empty() => block,
            other => {
                self.current = other;
                return;
            }
        };
        match self.last_event.clone() {
            Some(last_event) => self.pending.push(BufferedFrame::new(block, last_event)),
            None => self.buffers.release(block.into_buffer()),
        }
        if rent_next {
            self.current = Some(self.rent_block());
        }
    }

    fn release_pending(&mut self) {
        for frame in self.pending.drain(..) {
            self.buffers.release(frame.block.into_buffer());
        }
    }

    async fn flush_and_checkpoint(
        &mut self,
        context: &dyn PartitionContext,
    ) -> Result<(), ProcessorError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let writer = self.writer.as_mut().ok_or(ProcessorError::NotOpened)?;

        let blocks = self.pending.iter().map(|frame| &frame.block).collect::<Vec<_>>();
        if !writer.write(&blocks, &self.token).await? {
            debug!(
                "{}Write failed, keeping {} blocks for the next attempt",
                self.log_ident,
                self.pending.len()
            );
            return Ok(());
        }

        let checkpoint_event = self.pending.last().map(|frame| frame.last_event.clone());
        self.release_pending();
        let Some(event) = checkpoint_event else {
            return Ok(());
        };

        match context.checkpoint(&event).await {
            Ok(()) => {
                info!(
                    "{}Completed a checkpoint for offset {}",
                    self.log_ident, event.offset
                );
                Ok(())
            }
            Err(e) if e.is_expected() => {
                warn!("{}Could not checkpoint: {e}", self.log_ident);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stall while the breaker is tripped, flushing every stall interval, until the backlog
    /// drains below the warning level.
    async fn check_break(&mut self, context: &dyn PartitionContext) -> Result<(), ProcessorError> {
        if self.breaker.evaluate(self.pending.len()) != Verdict::Tripped {
            return Ok(());
        }

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(ProcessorError::Cancelled),
                _ = sleep(self.breaker.stall_interval()) => {}
            }
            self.flush_and_checkpoint(context).await?;
            if self.breaker.check_restored(self.pending.len()) {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl<W> EventProcessor for PartitionProcessor<W>
where
    W: BlobWriter,
{
    async fn open(&mut self, context: &dyn PartitionContext) -> Result<(), ProcessorError> {
        let partition_id = context.partition_id();
        self.log_ident = format!("Processor[{}#{}] ", self.event_hub, partition_id);
        info!("{}Obtained a lease", self.log_ident);

        self.writer = Some((self.writer_factory)(&partition_id)?);
        if let Some(block) = self.current.take() {
            self.buffers.release(block.into_buffer());
        }
        self.current = Some(self.rent_block());
        self.last_event = None;
        self.breaker.reset(self.log_ident.clone());
        Ok(())
    }

    async fn process_events(
        &mut self,
        context: &dyn PartitionContext,
        events: &[EventData],
    ) -> Result<(), ProcessorError> {
        self.ensure_open()?;

        if events.is_empty() {
            self.seal_current(true);
            info!(
                "{}Invoked without events. Flushing {} blocks",
                self.log_ident,
                self.pending.len()
            );
            return self.flush_and_checkpoint(context).await;
        }

        self.check_break(context).await?;

        for event in events {
            let event_ident = format!(
                "{}/{}/{}",
                self.event_hub,
                event.partition_key.as_deref().unwrap_or_default(),
                event.offset
            );
            if event.is_malformed() {
                error!(
                    "{}Payload of {event_ident} is not valid UTF-8, writing it lossily",
                    self.log_ident
                );
            }
            let bytes = self.encode(event).map_err(|e| {
                error!("{}Could not encode {event_ident}: {e}", self.log_ident);
                e
            })?;

            if bytes.len() > self.current.as_ref().map_or(0, Block::remaining) {
                self.seal_current(true);
                self.flush_and_checkpoint(context).await?;
                // A write never carries more than the trip level
                self.check_break(context).await?;
            }

            let block = self.current.as_mut().ok_or(ProcessorError::NotOpened)?;
            let appended = block.try_append(&bytes);
            debug_assert!(appended, "an empty block fits any encoded event");
            self.last_event = Some(event.clone());
        }
        Ok(())
    }

    async fn close(
        &mut self,
        context: &dyn PartitionContext,
        reason: CloseReason,
    ) -> Result<(), ProcessorError> {
        self.ensure_open()?;
        self.seal_current(false);

        let result = match reason {
            CloseReason::Shutdown => {
                info!("{}Shutting down", self.log_ident);
                self.flush_and_checkpoint(context).await
            }
            CloseReason::LeaseLost => {
                warn!(
                    "{}Lost the lease, discarding {} blocks",
                    self.log_ident,
                    self.pending.len()
                );
                Ok(())
            }
        };

        self.release_pending();
        if let Some(block) = self.current.take() {
            self.buffers.release(block.into_buffer());
        }
        self.last_event = None;
        self.writer = None;
        result
    }
}
