use std::collections::VecDeque;
use std::io;

use super::{ByteSource, SourceError};

/// In-memory byte queue; bytes become available as soon as they are fed.
#[derive(Debug, Default)]
pub struct MemorySource {
    pending: VecDeque<u8>,
    closed: bool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend(bytes);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl ByteSource for MemorySource {
    fn bytes_available(&mut self) -> Result<usize, SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        Ok(self.pending.len())
    }

    fn read_byte(&mut self) -> Result<u8, SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        self.pending
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof).into())
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.closed = true;
        self.pending.clear();
        Ok(())
    }
}
