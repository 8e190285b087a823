//! `scene_server`
//!
//! Server-side systems:
//! - Authoritative scene store with dirty tracking
//! - Diff engine producing minimal Create/Update/Delete batches
//! - Broadcast channel fanning batches out to viewer sessions
//! - Fixed-interval tick scheduler with observer lists
//! - Flush/batching control and the `SceneServer` facade
//!
//! Streaming model:
//! - TCP: handshake + ordered operation stream per viewer
//! - One mutex serializes store mutation, diffing, and publish

pub mod broadcast;
pub mod diff;
pub mod listener;
pub mod playback;
pub mod server;
pub mod store;
pub mod ticker;

pub use server::{SceneHandle, SceneServer};
pub use ticker::Ticker;
