use std::{sync::Arc, time::Duration};

use config::{error::ConfigurationError, Configuration};
use log::info;
use object_storage::{BlockStore, PartitionAndDateNamingStrategy, RollingBlobWriter};
use tokio_util::sync::CancellationToken;

use crate::{
    factory::ColdStorageProcessorFactory,
    processor::{PartitionProcessor, WriterFactory},
};

pub type ColdStorageWriter<S> = RollingBlobWriter<S, PartitionAndDateNamingStrategy>;

/// Options the lease host applies to its receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorOptions {
    pub max_batch_size: usize,
    pub prefetch_count: usize,
    pub receive_timeout: Duration,

    /// Invoke the processor with an empty batch when the receive timeout elapses.
    pub invoke_after_timeout: bool,
}

/// Wires a validated configuration and a block store into per-partition processors.
pub struct ColdStorageCoordinator<S: BlockStore + ?Sized> {
    configuration: Configuration,
    factory: ColdStorageProcessorFactory<ColdStorageWriter<S>>,
}

impl<S> ColdStorageCoordinator<S>
where
    S: BlockStore + ?Sized + 'static,
{
    pub fn new(configuration: Configuration, store: Arc<S>) -> Result<Self, ConfigurationError> {
        Self::with_token(configuration, store, CancellationToken::new())
    }

    /// Like [`Self::new`], but processors race their stalls and writes against `token`, so a
    /// shutdown requested by the caller reaches them without a [`Self::tear_down`].
    pub fn with_token(
        mut configuration: Configuration,
        store: Arc<S>,
        token: CancellationToken,
    ) -> Result<Self, ConfigurationError> {
        configuration.check_and_apply()?;
        info!(
            "Initializing event hub listener for {} ({})",
            configuration.event_hub.name, configuration.event_hub.consumer_group
        );

        let blob_writer = configuration.blob_writer.clone();
        let writer_factory: WriterFactory<ColdStorageWriter<S>> =
            Arc::new(move |partition_id: &str| {
                let naming = PartitionAndDateNamingStrategy::new(partition_id, &blob_writer.prefix);
                RollingBlobWriter::new(partition_id, Arc::clone(&store), naming, &blob_writer)
            });

        let factory = ColdStorageProcessorFactory::new(
            writer_factory,
            configuration.circuit_breaker.clone(),
            configuration.event_hub.name.clone(),
            configuration.blob_writer.block_size,
            token,
        );
        Ok(Self {
            configuration,
            factory,
        })
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn processor_options(&self) -> ProcessorOptions {
        let event_hub = &self.configuration.event_hub;
        ProcessorOptions {
            max_batch_size: event_hub.max_batch_size,
            prefetch_count: event_hub.prefetch_count,
            receive_timeout: event_hub.receive_timeout(),
            invoke_after_timeout: true,
        }
    }

    pub fn create_processor(&self) -> PartitionProcessor<ColdStorageWriter<S>> {
        self.factory.create_processor()
    }

    /// Token cancelled by [`Self::tear_down`]; processors race their stalls and writes against
    /// it.
    pub fn token(&self) -> CancellationToken {
        self.factory.token().clone()
    }

    /// Cancel in-flight writes and stalls of every processor created so far.
    pub fn tear_down(&self) {
        info!(
            "Tearing down event hub listener for {}",
            self.configuration.event_hub.name
        );
        self.factory.token().cancel();
    }
}
