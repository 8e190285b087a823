//! Observer interfaces.
//!
//! Producers register listeners instead of polling: the tick scheduler
//! invokes `TickListener`s at its fixed interval, and the server invokes
//! `ConnectionListener`s when a viewer completes its handshake. Listeners
//! run in registration order; a failing listener is logged and skipped,
//! never fatal.

use std::time::Duration;

use scene_shared::net::SessionId;

/// Invoked once per scheduler tick.
pub trait TickListener: Send {
    /// `now` is the elapsed time since the ticker was first started.
    fn on_tick(&mut self, now: Duration) -> anyhow::Result<()>;
}

impl<F> TickListener for F
where
    F: FnMut(Duration) -> anyhow::Result<()> + Send,
{
    fn on_tick(&mut self, now: Duration) -> anyhow::Result<()> {
        self(now)
    }
}

/// Invoked after a viewer connects and has been sent the full snapshot.
///
/// The documented pattern binds tick activity to demand: register a
/// connection listener that starts the ticker, so no work happens while
/// zero viewers are connected.
pub trait ConnectionListener: Send {
    fn on_connect(&mut self, session: SessionId) -> anyhow::Result<()>;
}

impl<F> ConnectionListener for F
where
    F: FnMut(SessionId) -> anyhow::Result<()> + Send,
{
    fn on_connect(&mut self, session: SessionId) -> anyhow::Result<()> {
        self(session)
    }
}
