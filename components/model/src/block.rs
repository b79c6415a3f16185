use crate::event::EventData;

/// Fixed-capacity byte buffer plus the count of bytes in use.
///
/// The capacity is the length of the backing buffer, which is rented from and returned to a
/// buffer pool as a whole.
#[derive(Debug)]
pub struct Block {
    buffer: Vec<u8>,
    len: usize,
}

impl Block {
    pub fn new(buffer: Vec<u8>) -> Self {
        Self { buffer, len: 0 }
    }

    /// Build a block whose used bytes are exactly `data`.
    pub fn from_data(data: &[u8]) -> Self {
        Self {
            buffer: data.to_vec(),
            len: data.len(),
        }
    }

    /// Copy `bytes` after the used region. Returns false, leaving the block untouched, if they
    /// do not fit.
    pub fn try_append(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.remaining() {
            return false;
        }
        self.buffer[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        true
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    /// Give the backing buffer back, e.g. to return it to its pool.
    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }
}

/// A sealed block together with the last event it holds, the checkpoint anchor once the
/// block is durably committed.
#[derive(Debug)]
pub struct BufferedFrame {
    pub block: Block,
    pub last_event: EventData,
}

impl BufferedFrame {
    pub fn new(block: Block, last_event: EventData) -> Self {
        Self { block, last_event }
    }
}
