//! Byte sources feeding the batch collector.
//!
//! A source only reports how many bytes are pending and hands them out one
//! at a time; data-available signalling and port lifecycle stay with the
//! caller (see `Connection`).

mod memory;
#[cfg(feature = "serial")]
mod serial;

pub use memory::MemorySource;
#[cfg(feature = "serial")]
pub use serial::SerialSource;

use thiserror::Error;

pub trait ByteSource {
    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> Result<usize, SourceError>;

    fn read_byte(&mut self) -> Result<u8, SourceError>;

    /// Release the underlying device. Further reads fail with `SourceError::Closed`.
    fn close(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Move every currently pending byte into `buffer`, returning the count.
    fn read_available(&mut self, buffer: &mut Vec<u8>) -> Result<usize, SourceError> {
        let mut read = 0;
        while self.bytes_available()? > 0 {
            buffer.push(self.read_byte()?);
            read += 1;
        }
        Ok(read)
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("source is closed")]
    Closed,
    #[error("device unavailable: {0}")]
    Unavailable(String),
}
