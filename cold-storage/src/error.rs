use config::error::ConfigurationError;
use model::error::EncodeError;
use object_storage::error::WriteError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointErrorKind {
    /// The checkpoint store could not be reached or rejected the request.
    Storage,

    /// The partition lease has moved to another owner.
    LeaseLost,

    Other,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to checkpoint ({kind:?}): {message}")]
pub struct CheckpointError {
    pub kind: CheckpointErrorKind,
    pub message: String,
}

impl CheckpointError {
    pub fn new(kind: CheckpointErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Storage and lease-lost failures are expected while a lease is handed over.
    pub fn is_expected(&self) -> bool {
        matches!(
            self.kind,
            CheckpointErrorKind::Storage | CheckpointErrorKind::LeaseLost
        )
    }
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("The processor is not open")]
    NotOpened,

    #[error("The processor was cancelled")]
    Cancelled,

    #[error("Failed to create the blob writer")]
    Configuration(#[from] ConfigurationError),

    #[error("Failed to encode an event")]
    Encode(#[from] EncodeError),

    #[error("Blob writer rejected the pending blocks")]
    Write(#[source] WriteError),

    #[error("Checkpoint failed")]
    Checkpoint(#[from] CheckpointError),
}

impl From<WriteError> for ProcessorError {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::Cancelled => ProcessorError::Cancelled,
            other => ProcessorError::Write(other),
        }
    }
}
