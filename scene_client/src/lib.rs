//! `scene_client`
//!
//! Viewer-side systems:
//! - Connection handshake against a scene server
//! - Applying the ordered operation stream to a local scene mirror
//!
//! The mirror starts from the full-snapshot Create batch the server sends
//! on connect, so it equals the server's broadcast state after every
//! received batch.

pub mod client;

pub use client::ViewerClient;
