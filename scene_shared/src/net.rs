//! Networking primitives and wire contract.
//!
//! Goals:
//! - Provide a simple reliable (TCP) frame channel shared by server and
//!   viewer.
//! - Provide the handshake and operation-stream message types.
//! - Keep serialization explicit and versionable.
//!
//! The wire contract: a viewer sends `Hello`, the server answers `Welcome`,
//! and the first `Ops` frame the viewer receives is a full-snapshot batch of
//! Create operations. After that, every published batch arrives in FIFO
//! order on the connection.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time,
};

use crate::scene::Operation;

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected viewer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl SessionId {
    pub fn new_unique() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WireMsg {
    // ─── Connection handshake ───
    Hello {
        protocol: u32,
    },
    Welcome {
        session_id: SessionId,
    },

    // ─── Scene replication ───
    /// Server -> viewer: an ordered batch of scene operations.
    Ops(Vec<Operation>),

    // ─── Disconnect ───
    Disconnect {
        reason: String,
    },
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct FrameConn {
    stream: TcpStream,
}

impl FrameConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn send(&mut self, msg: &WireMsg) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize msg")?;
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(&payload);
        self.stream.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }

    pub async fn recv(&mut self) -> anyhow::Result<WireMsg> {
        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .context("tcp read len")?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        let msg = serde_json::from_slice(&payload).context("deserialize msg")?;
        Ok(msg)
    }

    /// Receives a frame within the given timeout. `None` on timeout.
    pub async fn recv_timeout(
        &mut self,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Option<WireMsg>> {
        match time::timeout(timeout, self.recv()).await {
            Ok(msg) => Ok(Some(msg?)),
            Err(_) => Ok(None),
        }
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }
}

/// TCP server listener.
pub struct FrameListener {
    listener: TcpListener,
}

impl FrameListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(FrameConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((FrameConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes(msg: &WireMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<WireMsg> {
    serde_json::from_slice(b).context("deserialize")
}
