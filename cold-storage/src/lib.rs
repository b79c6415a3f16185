pub mod circuit_breaker;
pub mod cli;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod factory;
pub mod processor;
pub mod pump;
pub mod replay;

pub use crate::cli::Cli;
pub use crate::coordinator::ColdStorageCoordinator;
pub use crate::processor::{CloseReason, EventProcessor, PartitionProcessor};
