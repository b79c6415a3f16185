use log::{debug, info, warn};
use model::EventData;
use tokio::{
    sync::mpsc::{self, error::TryRecvError},
    time::timeout,
};
use tokio_util::sync::CancellationToken;

use crate::{
    context::PartitionContext,
    coordinator::ProcessorOptions,
    error::ProcessorError,
    processor::{CloseReason, EventProcessor},
};

/// Drives one processor from an in-process event channel, the way a lease host drives it from
/// a partition receiver: batches of at most `max_batch_size` events, and an empty batch whenever
/// `receive_timeout` elapses without events.
///
/// The pump stops, closing the processor for shutdown, once the channel is closed and drained
/// or the token is cancelled.
pub struct PartitionPump<P> {
    processor: P,
    options: ProcessorOptions,
    token: CancellationToken,
}

impl<P> PartitionPump<P>
where
    P: EventProcessor,
{
    pub fn new(processor: P, options: ProcessorOptions, token: CancellationToken) -> Self {
        Self {
            processor,
            options,
            token,
        }
    }

    pub async fn run(
        mut self,
        context: &dyn PartitionContext,
        mut events: mpsc::Receiver<EventData>,
    ) -> Result<(), ProcessorError> {
        let log_ident = format!("Pump[{}] ", context.partition_id());
        self.processor.open(context).await?;

        loop {
            let received = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    info!("{log_ident}Cancelled");
                    break;
                }
                received = timeout(self.options.receive_timeout, events.recv()) => received,
            };

            match received {
                Err(_) => {
                    debug!(
                        "{log_ident}Nothing received in {:?}",
                        self.options.receive_timeout
                    );
                    if self.options.invoke_after_timeout {
                        self.processor.process_events(context, &[]).await?;
                    }
                }
                Ok(None) => {
                    info!("{log_ident}Event channel closed");
                    break;
                }
                Ok(Some(event)) => {
                    let batch = self.fill_batch(event, &mut events, &log_ident);
                    self.processor.process_events(context, &batch).await?;
                }
            }
        }

        self.processor.close(context, CloseReason::Shutdown).await
    }

    fn fill_batch(
        &self,
        first: EventData,
        events: &mut mpsc::Receiver<EventData>,
        log_ident: &str,
    ) -> Vec<EventData> {
        let mut batch = vec![first];
        while batch.len() < self.options.max_batch_size {
            match events.try_recv() {
                Ok(event) => batch.push(event),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    warn!("{log_ident}Event channel disconnected while batching");
                    break;
                }
            }
        }
        batch
    }
}
