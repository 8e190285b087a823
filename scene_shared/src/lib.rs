//! `scene_shared`
//!
//! Shared libraries used by both the scene server and viewer clients.
//!
//! Design goals:
//! - Deterministic and modular where practical.
//! - Clear separation of concerns (math, scene model, net, config).
//! - Value semantics at the API boundary: callers never hold references
//!   into server-internal state.
//! - No `unsafe`.

pub mod config;
pub mod math;
pub mod net;
pub mod scene;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::scene::*;
}
