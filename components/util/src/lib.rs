pub mod buffer_pool;

pub use crate::buffer_pool::BufferPool;
