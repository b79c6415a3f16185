use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("`{key}` must be within [{min}, {max}], but got {actual}")]
    OutOfRange {
        key: &'static str,
        min: u64,
        max: u64,
        actual: u64,
    },

    #[error("`{0}` must not be empty")]
    Empty(&'static str),

    #[error("Roll size of {roll_size} bytes exceeds blocks-allowed x block-size = {capacity} bytes")]
    RollSizeTooLarge { roll_size: u64, capacity: u64 },

    #[error("Warning level {warning} must not be greater than trip level {trip}")]
    WarningAboveTrip { warning: usize, trip: usize },

    #[error(
        "Trip level {trip_level} lets {trip_level} blocks of {block_size} bytes pile up, more than a \
         blob takes ({blocks_allowed} blocks, {roll_size} bytes)"
    )]
    BacklogExceedsBlob {
        trip_level: usize,
        blocks_allowed: usize,
        block_size: usize,
        roll_size: u64,
    },

    #[error("An IO error raised")]
    Io(#[from] std::io::Error),

    #[error("Malformed configuration file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
