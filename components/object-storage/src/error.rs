use thiserror::Error;

/// Classification of a storage fault, decided where the fault is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Timeouts and throttling. Retrying later is expected to succeed.
    Transient,

    /// A conditional request found the object in a state other than the one assumed.
    ConcurrencyConflict,

    /// The container or account is unusable. Requires an operator.
    Hard,

    Other,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Storage request failed: {code} ({message})")]
pub struct StorageError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Classify a storage service error code.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let kind = match code {
            "ContainerBeingDeleted"
            | "ContainerDisabled"
            | "ContainerNotFound"
            | "AuthenticationFailed"
            | "AccountIsDisabled" => ErrorKind::Hard,
            "ConditionNotMet" | "BlobAlreadyExists" => ErrorKind::ConcurrencyConflict,
            "ServerBusy" | "OperationTimedOut" | "InternalError" => ErrorKind::Transient,
            _ => ErrorKind::Other,
        };
        Self::new(kind, code, message)
    }

    pub fn is_hard(&self) -> bool {
        self.kind == ErrorKind::Hard
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::ConcurrencyConflict
    }
}

/// Errors a blob writer reports instead of `Ok(false)`.
///
/// Apart from cancellation these are violations of the caller contract; retrying the same
/// batch would fail again.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("{count} blocks requested, at most {allowed} fit in one blob")]
    TooManyBlocks { count: usize, allowed: usize },

    #[error("Block #{index} holds {len} bytes, more than the block size {block_size}")]
    BlockTooLarge {
        index: usize,
        len: usize,
        block_size: usize,
    },

    #[error("Batch of {total} bytes is larger than the roll size {roll_size}")]
    RollSizeExceeded { total: u64, roll_size: u64 },

    #[error("Write was cancelled")]
    Cancelled,
}
