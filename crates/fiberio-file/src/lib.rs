//! # fiberio-file
//!
//! `ReadonlyFile` is the read side shared by local files and remote objects.
//! Reads are positional; implementations decide whether arbitrary offsets
//! are allowed (local files) or only sequential ones (streamed objects).

use std::future::Future;

use fiberio_core::NetResult;

pub mod local;

pub use local::LocalReadFile;

/// Read-only, positional file access from fibers.
pub trait ReadonlyFile: Send {
    /// Read up to `buf.len()` bytes at `offset`. `Ok(0)` means end of file.
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> impl Future<Output = NetResult<usize>> + Send;

    /// Release the underlying resource. Further reads fail.
    fn close(&mut self) -> impl Future<Output = NetResult<()>> + Send;

    /// Total size in bytes.
    fn size(&self) -> u64;
}
