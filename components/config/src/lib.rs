use error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::{fs::File, path::Path, time::Duration};
pub mod error;

pub const MEGA_BYTES: u64 = 1024 * 1024;

/// Largest block the storage service accepts in a single put-block request.
pub const MAX_BLOCK_SIZE: usize = 4 * MEGA_BYTES as usize;

/// Largest number of committed blocks a single block blob may reference.
pub const MAX_BLOCKS_ALLOWED: usize = 50_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventHub {
    pub name: String,

    #[serde(rename = "consumer-group")]
    pub consumer_group: String,

    #[serde(rename = "max-batch-size")]
    pub max_batch_size: usize,

    #[serde(rename = "prefetch-count")]
    pub prefetch_count: usize,

    #[serde(rename = "receive-timeout-secs")]
    pub receive_timeout_secs: u64,
}

impl EventHub {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.receive_timeout_secs)
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self {
            name: String::new(),
            consumer_group: "ColdStorage".to_owned(),
            max_batch_size: 1000,
            prefetch_count: 2000,
            receive_timeout_secs: 7 * 60,
        }
    }
}

/// How the rolling writer picks the blob to append to when nothing is cached for a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CurrentBlobSelection {
    /// The blob with the largest trailing sequence number.
    HighestSequence,

    /// The most recently modified blob. Matches blobs laid out by earlier deployments, but an
    /// unrelated metadata touch on an older blob makes it win.
    LastModified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobWriter {
    pub container: String,

    /// Deployment prefix, the first segment of every blob name.
    pub prefix: String,

    #[serde(rename = "roll-size-mb")]
    pub roll_size_mb: u64,

    #[serde(rename = "blocks-allowed")]
    pub blocks_allowed: usize,

    /// Size in bytes of each in-memory block and of each put-block request.
    #[serde(rename = "block-size")]
    pub block_size: usize,

    #[serde(rename = "current-blob-selection")]
    pub current_blob_selection: CurrentBlobSelection,
}

impl BlobWriter {
    pub fn roll_size_bytes(&self) -> u64 {
        self.roll_size_mb * MEGA_BYTES
    }

    /// Check the writer settings against the limits of the storage service.
    pub fn check(&self) -> Result<(), ConfigurationError> {
        if self.prefix.is_empty() {
            return Err(ConfigurationError::Empty("blob-writer.prefix"));
        }
        if self.container.is_empty() {
            return Err(ConfigurationError::Empty("blob-writer.container"));
        }

        check_range(
            "blob-writer.block-size",
            self.block_size as u64,
            1,
            MAX_BLOCK_SIZE as u64,
        )?;
        check_range(
            "blob-writer.blocks-allowed",
            self.blocks_allowed as u64,
            1,
            MAX_BLOCKS_ALLOWED as u64,
        )?;
        check_range(
            "blob-writer.roll-size-mb",
            self.roll_size_mb,
            1,
            u64::MAX / MEGA_BYTES,
        )?;

        let capacity = self.blocks_allowed as u64 * self.block_size as u64;
        let roll_size = self.roll_size_bytes();
        if roll_size > capacity {
            return Err(ConfigurationError::RollSizeTooLarge {
                roll_size,
                capacity,
            });
        }
        Ok(())
    }
}

impl Default for BlobWriter {
    fn default() -> Self {
        Self {
            container: "coldstorage".to_owned(),
            prefix: "pnp-iotjourney".to_owned(),
            roll_size_mb: 2048,
            blocks_allowed: MAX_BLOCKS_ALLOWED,
            block_size: MAX_BLOCK_SIZE,
            current_blob_selection: CurrentBlobSelection::HighestSequence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreaker {
    /// Number of pending blocks from which a rate-limited warning is logged.
    #[serde(rename = "warning-level")]
    pub warning_level: usize,

    /// Number of pending blocks from which intake stalls until the backlog drains.
    #[serde(rename = "trip-level")]
    pub trip_level: usize,

    #[serde(rename = "stall-interval-secs")]
    pub stall_interval_secs: u64,

    #[serde(rename = "log-cooldown-interval-secs")]
    pub log_cooldown_interval_secs: u64,
}

impl CircuitBreaker {
    pub fn stall_interval(&self) -> Duration {
        Duration::from_secs(self.stall_interval_secs)
    }

    pub fn log_cooldown_interval(&self) -> Duration {
        Duration::from_secs(self.log_cooldown_interval_secs)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            warning_level: 200,
            trip_level: 400,
            stall_interval_secs: 30,
            log_cooldown_interval_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    #[serde(rename = "event-hub")]
    pub event_hub: EventHub,

    #[serde(rename = "blob-writer")]
    pub blob_writer: BlobWriter,

    #[serde(rename = "circuit-breaker")]
    pub circuit_breaker: CircuitBreaker,
}

fn check_range(key: &'static str, actual: u64, min: u64, max: u64) -> Result<(), ConfigurationError> {
    if actual < min || actual > max {
        return Err(ConfigurationError::OutOfRange {
            key,
            min,
            max,
            actual,
        });
    }
    Ok(())
}

impl Configuration {
    /// Load configuration from a YAML file. Keys absent from the file keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let configuration = serde_yaml::from_reader(File::open(path)?)?;
        Ok(configuration)
    }

    /// Check the configuration against the limits of the storage service.
    ///
    /// The configuration is loaded once at startup; nothing re-evaluates it afterwards, so every
    /// bound the writer and the processor rely on is enforced here.
    pub fn check_and_apply(&mut self) -> Result<(), ConfigurationError> {
        self.blob_writer.prefix = self.blob_writer.prefix.trim_matches('/').to_owned();
        self.blob_writer.check()?;

        check_range(
            "event-hub.max-batch-size",
            self.event_hub.max_batch_size as u64,
            1,
            u64::MAX,
        )?;

        let breaker = &self.circuit_breaker;
        check_range(
            "circuit-breaker.warning-level",
            breaker.warning_level as u64,
            1,
            u64::MAX,
        )?;
        if breaker.warning_level > breaker.trip_level {
            return Err(ConfigurationError::WarningAboveTrip {
                warning: breaker.warning_level,
                trip: breaker.trip_level,
            });
        }
        // A tripped processor hands all pending blocks to a single write
        let blob_writer = &self.blob_writer;
        if breaker.trip_level > blob_writer.blocks_allowed
            || breaker.trip_level as u64 * blob_writer.block_size as u64
                > blob_writer.roll_size_bytes()
        {
            return Err(ConfigurationError::BacklogExceedsBlob {
                trip_level: breaker.trip_level,
                blocks_allowed: blob_writer.blocks_allowed,
                block_size: blob_writer.block_size,
                roll_size: blob_writer.roll_size_bytes(),
            });
        }
        check_range(
            "circuit-breaker.stall-interval-secs",
            breaker.stall_interval_secs,
            1,
            u64::MAX,
        )?;
        Ok(())
    }
}
