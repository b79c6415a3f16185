//! Size-keyed slab of reusable byte buffers.
//!
//! In-flight blocks are large (up to 4 MB each) and short lived; renting them from a pool keeps
//! a busy partition from churning the allocator. A rented buffer is owned by exactly one holder
//! until it is released back.

use std::collections::HashMap;

use log::trace;
use parking_lot::Mutex;

#[derive(Debug)]
pub struct BufferPool {
    /// Upper bound of idle buffers kept for each size class.
    max_idle: usize,
    slabs: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
}

impl BufferPool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            max_idle,
            slabs: Mutex::new(HashMap::new()),
        }
    }

    /// Rent a buffer whose length is exactly `size`.
    ///
    /// Contents of a recycled buffer are whatever its previous holder left behind.
    pub fn rent(&self, size: usize) -> Vec<u8> {
        let recycled = self
            .slabs
            .lock()
            .get_mut(&size)
            .and_then(|slab| slab.pop());
        match recycled {
            Some(buffer) => buffer,
            None => {
                trace!("Allocating a new buffer of {size} bytes");
                vec![0; size]
            }
        }
    }

    /// Hand a buffer back. Its length selects the size class it is filed under.
    pub fn release(&self, buffer: Vec<u8>) {
        let size = buffer.len();
        if size == 0 {
            return;
        }
        let mut slabs = self.slabs.lock();
        let slab = slabs.entry(size).or_default();
        if slab.len() < self.max_idle {
            slab.push(buffer);
        } else {
            trace!("Pool for {size}-byte buffers is full, dropping returned buffer");
        }
    }

    /// Number of idle buffers of the given size.
    pub fn idle(&self, size: usize) -> usize {
        self.slabs.lock().get(&size).map_or(0, Vec::len)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(5)
    }
}
