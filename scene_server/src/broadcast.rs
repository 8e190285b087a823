//! Broadcast channel.
//!
//! Owns every connected viewer session and fans operation batches out to
//! them. Each session gets a bounded transmit queue drained by a detached
//! writer task that owns the socket, so publishing never blocks the
//! producer: FIFO per session comes from the single queue, and a viewer
//! that cannot keep up is disconnected rather than stalling anyone else.

use std::collections::HashMap;

use scene_shared::net::{FrameConn, SessionId, WireMsg};
use scene_shared::scene::Operation;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Connection state of one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, snapshot not yet queued.
    Connecting,
    /// Receiving the operation stream.
    Open,
    /// Being torn down.
    Closed,
}

/// One connected viewer. Owned exclusively by the broadcast channel;
/// dropping the sender lets the writer task drain and exit.
struct ViewerSession {
    state: SessionState,
    tx: mpsc::Sender<WireMsg>,
    /// Parked receiving half, claimed by the writer task on connect.
    rx_for_writer: Option<mpsc::Receiver<WireMsg>>,
}

/// Fan-out of operation batches to all connected viewers.
pub struct BroadcastChannel {
    sessions: HashMap<SessionId, ViewerSession>,
    queue_capacity: usize,
}

impl BroadcastChannel {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Registers a new viewer and queues the full-snapshot Create batch as
    /// its first frame, so the viewer sees Create before any Update/Delete
    /// for every identifier. Spawns the writer task; must be called from
    /// within a tokio runtime.
    pub fn connect(&mut self, id: SessionId, conn: FrameConn, snapshot_ops: Vec<Operation>) {
        let tx = self.register(id);
        // Fresh queue with capacity >= 1: the snapshot frame always fits.
        let _ = tx.try_send(WireMsg::Ops(snapshot_ops));
        if let Some(session) = self.sessions.get_mut(&id) {
            session.state = SessionState::Open;
        }
        let rx = self
            .sessions
            .get_mut(&id)
            .and_then(|s| s.rx_for_writer.take());
        if let Some(rx) = rx {
            tokio::spawn(write_loop(id, conn, rx));
        }
        info!(session = ?id, viewers = self.sessions.len(), "viewer connected");
    }

    /// Registers a session and returns its transmit handle. The receiving
    /// half is parked on the session until a writer claims it; unit tests
    /// drive it directly instead of spawning a socket writer.
    pub(crate) fn register(&mut self, id: SessionId) -> mpsc::Sender<WireMsg> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.sessions.insert(
            id,
            ViewerSession {
                state: SessionState::Connecting,
                tx: tx.clone(),
                rx_for_writer: Some(rx),
            },
        );
        tx
    }

    /// Enqueues a batch to every open session. Non-blocking: a full queue
    /// means a slow consumer, which is disconnected; a closed queue means
    /// the transport already died. Publishing with zero viewers, or an
    /// empty batch, is a successful no-op.
    pub fn publish(&mut self, ops: &[Operation]) {
        if ops.is_empty() || self.sessions.is_empty() {
            return;
        }
        let mut dead: Vec<SessionId> = Vec::new();
        for (id, session) in &self.sessions {
            if session.state != SessionState::Open {
                continue;
            }
            match session.tx.try_send(WireMsg::Ops(ops.to_vec())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(session = ?id, "slow consumer, disconnecting viewer");
                    dead.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(session = ?id, "viewer transport closed");
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            self.disconnect(id);
        }
    }

    /// Removes a session and releases its queue; the writer task drains
    /// whatever is left and exits.
    pub fn disconnect(&mut self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            info!(session = ?id, viewers = self.sessions.len(), "viewer disconnected");
        }
    }

    /// Closes all sessions, telling each viewer why.
    pub fn shutdown(&mut self) {
        for (id, session) in self.sessions.drain() {
            let _ = session.tx.try_send(WireMsg::Disconnect {
                reason: "server shutting down".to_string(),
            });
            debug!(session = ?id, "session closed on shutdown");
        }
    }
}

/// Drains one session's queue to its socket. A write failure is treated as
/// a disconnect; cleanup happens on the next publish when the channel shows
/// up closed.
async fn write_loop(id: SessionId, mut conn: FrameConn, mut rx: mpsc::Receiver<WireMsg>) {
    while let Some(msg) = rx.recv().await {
        if let Err(error) = conn.send(&msg).await {
            debug!(session = ?id, %error, "viewer write failed");
            return;
        }
        if matches!(msg, WireMsg::Disconnect { .. }) {
            return;
        }
    }
    debug!(session = ?id, "viewer writer drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_shared::math::Vec3;
    use scene_shared::scene::{Color, Geometry, RenderObject, Transform};

    fn delete_op(id: &str) -> Operation {
        Operation::Delete { id: id.into() }
    }

    fn create_op(id: &str) -> Operation {
        Operation::Create {
            id: id.into(),
            object: RenderObject::new(
                Geometry::Sphere { radius: 1.0 },
                Transform::at(Vec3::ZERO),
                Color::RED,
            ),
        }
    }

    #[test]
    fn publish_with_zero_viewers_is_a_noop() {
        let mut chan = BroadcastChannel::new(4);
        chan.publish(&[create_op("a")]);
        assert_eq!(chan.session_count(), 0);
    }

    #[tokio::test]
    async fn publish_preserves_fifo_per_session() {
        let mut chan = BroadcastChannel::new(8);
        let id = SessionId::new_unique();
        let tx = chan.register(id);
        let mut rx = chan.sessions.get_mut(&id).unwrap().rx_for_writer.take().unwrap();
        chan.sessions.get_mut(&id).unwrap().state = SessionState::Open;
        drop(tx);

        chan.publish(&[create_op("a")]);
        chan.publish(&[delete_op("a")]);

        assert_eq!(rx.recv().await, Some(WireMsg::Ops(vec![create_op("a")])));
        assert_eq!(rx.recv().await, Some(WireMsg::Ops(vec![delete_op("a")])));
    }

    #[tokio::test]
    async fn slow_consumer_is_disconnected_others_survive() {
        let mut chan = BroadcastChannel::new(1);
        let slow = SessionId::new_unique();
        let healthy = SessionId::new_unique();

        let _slow_tx = chan.register(slow);
        // Never drained: its queue of 1 fills on the first publish.
        let _slow_rx = chan.sessions.get_mut(&slow).unwrap().rx_for_writer.take().unwrap();
        chan.sessions.get_mut(&slow).unwrap().state = SessionState::Open;

        let _healthy_tx = chan.register(healthy);
        let mut healthy_rx = chan
            .sessions
            .get_mut(&healthy)
            .unwrap()
            .rx_for_writer
            .take()
            .unwrap();
        chan.sessions.get_mut(&healthy).unwrap().state = SessionState::Open;

        chan.publish(&[create_op("a")]);
        // Healthy viewer drains; slow one does not.
        assert_eq!(
            healthy_rx.recv().await,
            Some(WireMsg::Ops(vec![create_op("a")]))
        );
        chan.publish(&[create_op("b")]);

        assert_eq!(chan.session_count(), 1);
        assert!(chan.sessions.contains_key(&healthy));
        assert_eq!(
            healthy_rx.recv().await,
            Some(WireMsg::Ops(vec![create_op("b")]))
        );
    }

    #[tokio::test]
    async fn shutdown_closes_all_sessions() {
        let mut chan = BroadcastChannel::new(4);
        let id = SessionId::new_unique();
        chan.register(id);
        let mut rx = chan.sessions.get_mut(&id).unwrap().rx_for_writer.take().unwrap();
        chan.sessions.get_mut(&id).unwrap().state = SessionState::Open;

        chan.shutdown();
        assert_eq!(chan.session_count(), 0);
        assert!(matches!(
            rx.recv().await,
            Some(WireMsg::Disconnect { .. })
        ));
    }
}
