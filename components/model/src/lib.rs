pub mod block;
pub mod error;
pub mod event;

pub use crate::block::Block;
pub use crate::block::BufferedFrame;
pub use crate::event::ColdStorageEvent;
pub use crate::event::EventData;
