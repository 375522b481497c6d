//! # fiberio-http
//!
//! Ranged HTTP object reads for fiberio.
//!
//! - `HttpConnectionPool` / `ClientHandle`: pooled HTTP/1.1 connections to
//!   one authority
//! - `StreamingObjectReader`: sequential, truncation-tolerant body reader
//! - `ObjectPath`: `gs://bucket/object` addressing
//! - `range`: `Range` / `Content-Range` helpers

mod error;
pub mod object_path;
pub mod pool;
pub mod range;
pub mod reader;

#[cfg(test)]
mod test_server;

pub use object_path::{is_object_path, ObjectPath};
pub use pool::{ClientHandle, HttpConnectionPool, PoolConfig};
pub use range::{object_size, parse_content_range, range_header, ContentRange};
pub use reader::{open_object_reader, ReaderOptions, StreamingObjectReader};
