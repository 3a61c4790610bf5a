//! Extension Proxy Channel
//!
//! The persistent per-user WebSocket through which the gateway hands HTTP
//! requests to the caller's browser extension and receives raw responses
//! back. The router here is framework-free: the server crate owns the actual
//! socket and pumps frames in and out through an mpsc writer and
//! [`router::ProxyRouter::handle_frame`].

pub mod messages;
pub mod router;

pub use messages::{ProxyResponseType, WireMessage};
pub use router::{OutboundFrame, ProxyError, ProxyRequestSpec, ProxyResponsePayload, ProxyRouter};
