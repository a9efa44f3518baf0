//! WebSocket transport for the real-time relay.
//!
//! This module only moves frames between a socket and the relay's hub. All
//! session, channel and signaling state lives in the `realtime` crate.

pub mod handler;
