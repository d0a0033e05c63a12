//! Byte-addressable backing stores for a B-tree.
//!
//! The tree never touches a file directly. Every node read and write goes
//! through the [`Store`] trait so the same engine runs against a real
//! volume file ([`FileStore`]) or an in-memory buffer with fault injection
//! ([`MemoryStore`]) in tests.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::{FaultConfig, MemoryStore, StoreStats};

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the operating system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Access past the end of the store.
    #[error("access of {len} bytes at offset {offset} is out of bounds (store size: {size})")]
    OutOfBounds { offset: u64, len: usize, size: u64 },
    /// Injected fault for simulation.
    #[error("injected fault: {0}")]
    InjectedFault(String),
}

/// Random-access storage holding the nodes of one tree.
///
/// Offsets are absolute byte positions. Node `n` lives at `n * node_size`.
pub trait Store {
    /// Fill `buf` with the bytes starting at `offset`.
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), StoreError>;

    /// Write `bytes` starting at `offset`. The range must already exist.
    fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<(), StoreError>;

    /// Current size of the store in bytes.
    fn size(&self) -> u64;

    /// Grow the store to at least `new_size` bytes.
    ///
    /// New bytes read as zero. Returns the resulting size, which may be
    /// smaller than requested if the store cannot grow that far.
    fn allocate_more(&mut self, new_size: u64) -> Result<u64, StoreError>;

    /// Flush buffered writes to durable storage.
    fn sync(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Read a big-endian `u16` at `offset` in `bytes`.
#[must_use]
pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

/// Read a big-endian `u32` at `offset` in `bytes`.
#[must_use]
pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

pub(crate) fn write_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

pub(crate) fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}
