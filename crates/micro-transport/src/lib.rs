//! micro transport layer
//!
//! Two adapters in front of one call handler:
//! - HTTP: any method on `{prefix}/{service}/{logic}/{function}`
//! - WebSocket: `call` frames acknowledged with `ack` frames
//!
//! Both normalize their input into a `CallPayload`, hand it to the
//! `CallHandler`, and write the same `{success, data}` envelope back. The
//! transport is decoupled from routing via the `CallHandler` trait.

pub mod client;
pub mod http;
pub mod server;
pub mod socket;

pub use client::ClientConnection;
pub use server::{CallHandler, SocketConfig, TransportConfig, TransportServer, build_router};
