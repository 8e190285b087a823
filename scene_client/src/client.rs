//! Viewer client implementation.
//!
//! The client maintains:
//! - A reliable frame connection (handshake + operation stream)
//! - A local scene mirror rebuilt purely from received operations
//!
//! It never mutates the mirror on its own: after every applied batch the
//! mirror equals the server's last-broadcast state at that point in the
//! stream.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use scene_shared::net::{FrameConn, SessionId, WireMsg, PROTOCOL_VERSION};
use scene_shared::scene::SceneSnapshot;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// A connected viewer mirroring the server scene.
pub struct ViewerClient {
    pub session_id: SessionId,
    conn: FrameConn,
    scene: SceneSnapshot,
    ops_applied: u64,
}

impl ViewerClient {
    /// Connects and performs the handshake. The first batch received after
    /// this is the full-snapshot sync.
    pub async fn connect(server_addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(server_addr)
            .await
            .context("tcp connect")?;
        let mut conn = FrameConn::new(stream);

        conn.send(&WireMsg::Hello {
            protocol: PROTOCOL_VERSION,
        })
        .await?;

        let session_id = match conn.recv().await? {
            WireMsg::Welcome { session_id } => session_id,
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        };
        info!(session = ?session_id, server = %server_addr, "connected to scene server");

        Ok(Self {
            session_id,
            conn,
            scene: SceneSnapshot::new(),
            ops_applied: 0,
        })
    }

    /// Receives the next batch and applies it to the mirror. Returns the
    /// number of operations applied; fails when the server disconnects us
    /// or the transport breaks.
    pub async fn recv(&mut self) -> anyhow::Result<usize> {
        let msg = self.conn.recv().await?;
        self.apply_msg(msg)
    }

    /// Like `recv`, but returns `None` when nothing arrives in time.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> anyhow::Result<Option<usize>> {
        match self.conn.recv_timeout(timeout).await? {
            Some(msg) => self.apply_msg(msg).map(Some),
            None => Ok(None),
        }
    }

    /// Applies batches until the stream goes quiet for `idle`.
    pub async fn drain(&mut self, idle: Duration) -> anyhow::Result<usize> {
        let mut total = 0;
        while let Some(n) = self.recv_timeout(idle).await? {
            total += n;
        }
        Ok(total)
    }

    fn apply_msg(&mut self, msg: WireMsg) -> anyhow::Result<usize> {
        match msg {
            WireMsg::Ops(ops) => {
                for op in &ops {
                    self.scene.apply(op);
                }
                self.ops_applied += ops.len() as u64;
                debug!(batch = ops.len(), objects = self.scene.len(), "applied batch");
                Ok(ops.len())
            }
            WireMsg::Disconnect { reason } => {
                anyhow::bail!("server disconnected us: {reason}")
            }
            other => anyhow::bail!("unexpected msg in stream: {other:?}"),
        }
    }

    /// The local mirror of the server scene.
    pub fn scene(&self) -> &SceneSnapshot {
        &self.scene
    }

    /// Total operations applied since connect.
    pub fn ops_applied(&self) -> u64 {
        self.ops_applied
    }
}
