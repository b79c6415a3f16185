use std::sync::Arc;

use config::Configuration;
use log::info;
use model::EventData;
use object_storage::MemoryBlockStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    context::MemoryCheckpointStore, coordinator::ColdStorageCoordinator, pump::PartitionPump,
};

/// What a replay left behind in the in-memory container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Committed blob names with their sizes in bytes.
    pub blobs: Vec<(String, usize)>,

    pub checkpoint: Option<String>,
}

/// Feed `bodies`, one event each, through the full pipeline of one partition into an in-memory
/// block store. Offsets and sequence numbers are the zero-based positions of the bodies.
pub async fn replay(
    configuration: Configuration,
    partition_id: &str,
    bodies: Vec<String>,
    token: CancellationToken,
) -> anyhow::Result<ReplaySummary> {
    let store = Arc::new(MemoryBlockStore::new());
    let coordinator =
        ColdStorageCoordinator::with_token(configuration, Arc::clone(&store), token.clone())?;
    let checkpoints = MemoryCheckpointStore::new();

    let options = coordinator.processor_options();
    let (tx, rx) = mpsc::channel(options.prefetch_count.max(1));
    let pump = PartitionPump::new(coordinator.create_processor(), options, token);

    let total = bodies.len();
    let producer = tokio::spawn(async move {
        for (sequence, body) in bodies.into_iter().enumerate() {
            let event = EventData::new(body, sequence.to_string(), sequence as i64);
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    let context = checkpoints.context(partition_id);
    pump.run(&context, rx).await?;
    producer.await?;

    let blobs = store
        .blob_names()
        .into_iter()
        .map(|name| {
            let size = store.download(&name).map_or(0, |data| data.len());
            (name, size)
        })
        .collect::<Vec<_>>();
    info!(
        "Replayed {total} events into {} blobs of container {}",
        blobs.len(),
        coordinator.configuration().blob_writer.container
    );
    Ok(ReplaySummary {
        blobs,
        checkpoint: checkpoints.offset(partition_id),
    })
}
