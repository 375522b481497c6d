//! # fiberio-net
//!
//! Socket-level components running on fiberio execution contexts.
//!
//! - `AcceptServer`: listener + accept loop, handlers spread over a context
//!   pool, drained on stop
//! - `ClientChannel`: outbound connection with bounded connect and
//!   autonomous reconnect
//! - `ReconnectBackoff`: the 100ms..1s linear retry delay both share

pub mod accept_server;
pub mod backoff;
pub mod client_channel;
mod registry;

pub use accept_server::{
    AcceptServer, AcceptServerOptions, ConnectionHandler, MAX_BACKLOG_PENDING_CONNECTIONS,
};
pub use backoff::ReconnectBackoff;
pub use client_channel::{ClientChannel, ClientChannelOptions, RECONNECT_DEADLINE};
pub use registry::ConnectionId;
