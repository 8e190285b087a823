//! Scene server facade.
//!
//! Wires the store, diff engine, broadcast channel, and ticker into one
//! explicitly constructed instance (no process-wide singletons). The
//! producer-facing API is `upsert`/`remove`/`clear`, flush control, and
//! listener registration; viewers connect over TCP and receive the
//! operation stream.
//!
//! Concurrency model:
//! - One mutex guards the store, the last-broadcast baseline, the broadcast
//!   channel, and the autoflush flag. Every mutation/publish/connect path
//!   takes it, so a connecting viewer snapshots state strictly between
//!   batches, never mid-batch.
//! - The accept loop and the tick task run concurrently; neither holds the
//!   lock across an await.
//! - Publishing is queue-and-forget: network IO happens on per-session
//!   writer tasks, never under the lock.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::time::Duration;

use anyhow::Context;
use scene_shared::config::ServerConfig;
use scene_shared::net::{FrameConn, FrameListener, SessionId, WireMsg, PROTOCOL_VERSION};
use scene_shared::scene::{Color, Geometry, RenderObject, SceneSnapshot, Transform};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::BroadcastChannel;
use crate::diff;
use crate::listener::{ConnectionListener, TickListener};
use crate::store::SceneStore;
use crate::ticker::Ticker;

/// Viewers get this long to complete the handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

struct ServerInner {
    store: SceneStore,
    /// Last-broadcast state; always equals the replay of every published
    /// batch. New viewers are synced from here.
    baseline: SceneSnapshot,
    broadcast: BroadcastChannel,
    autoflush: bool,
}

impl ServerInner {
    /// Diffs pending mutations against the baseline, publishes the batch,
    /// and advances the baseline. Returns the number of operations sent.
    fn flush(&mut self) -> usize {
        let touched = self.store.take_touched();
        if touched.is_empty() {
            return 0;
        }
        let ops = diff::diff(&self.baseline, self.store.live(), &touched);
        for op in &ops {
            self.baseline.apply(op);
        }
        self.broadcast.publish(&ops);
        ops.len()
    }
}

/// Cloneable producer handle onto one server's scene. Tick listeners and
/// background producers hold one of these; all methods serialize through
/// the server mutex and never block on network IO.
#[derive(Clone)]
pub struct SceneHandle {
    inner: Arc<Mutex<ServerInner>>,
}

impl SceneHandle {
    fn lock(&self) -> MutexGuard<'_, ServerInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Creates or replaces an object. All payload data is copied on store;
    /// the caller keeps no alias into server state.
    pub fn upsert(
        &self,
        id: impl Into<String>,
        geometry: Geometry,
        transform: Transform,
        color: Color,
    ) {
        self.upsert_object(id, RenderObject::new(geometry, transform, color));
    }

    pub fn upsert_object(&self, id: impl Into<String>, object: RenderObject) {
        let mut inner = self.lock();
        inner.store.upsert(id, object);
        if inner.autoflush {
            inner.flush();
        }
    }

    /// Deletes an object. Unknown identifiers are ignored with a diagnostic.
    pub fn remove(&self, id: &str) {
        let mut inner = self.lock();
        inner.store.remove(id);
        if inner.autoflush {
            inner.flush();
        }
    }

    /// Removes every object.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.store.clear();
        if inner.autoflush {
            inner.flush();
        }
    }

    /// Owned copy of the authoritative state.
    pub fn snapshot(&self) -> SceneSnapshot {
        self.lock().store.snapshot()
    }

    /// When enabled (the default), every mutation immediately diffs and
    /// publishes. Disabling lets high-frequency per-tick annotations
    /// accumulate and collapse before anything hits the network; re-enabling
    /// flushes whatever accumulated.
    pub fn set_autoflush(&self, enabled: bool) {
        let mut inner = self.lock();
        inner.autoflush = enabled;
        if enabled {
            inner.flush();
        }
    }

    /// Publishes all accumulated mutations as one batch. Returns the number
    /// of operations sent (zero when everything collapsed or nothing was
    /// dirty).
    pub fn flush(&self) -> usize {
        self.lock().flush()
    }

    /// Whether unpublished mutations are pending.
    pub fn is_dirty(&self) -> bool {
        self.lock().store.is_dirty()
    }

    pub fn viewer_count(&self) -> usize {
        self.lock().broadcast.session_count()
    }
}

/// Realtime scene-streaming server instance.
pub struct SceneServer {
    cfg: ServerConfig,
    handle: SceneHandle,
    ticker: Ticker,
    conn_listeners: Arc<Mutex<Vec<Box<dyn ConnectionListener>>>>,
    accept_task: Option<JoinHandle<()>>,
    shutdown: Arc<Notify>,
    serving: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
}

impl SceneServer {
    pub fn new(cfg: ServerConfig) -> Self {
        let handle = SceneHandle {
            inner: Arc::new(Mutex::new(ServerInner {
                store: SceneStore::new(),
                baseline: SceneSnapshot::new(),
                broadcast: BroadcastChannel::new(cfg.session_queue),
                autoflush: cfg.autoflush,
            })),
        };
        let ticker = Ticker::new(cfg.tick_interval());
        Self {
            cfg,
            handle,
            ticker,
            conn_listeners: Arc::new(Mutex::new(Vec::new())),
            accept_task: None,
            shutdown: Arc::new(Notify::new()),
            serving: Arc::new(AtomicBool::new(false)),
            local_addr: None,
        }
    }

    /// Producer handle sharing this server's scene.
    pub fn handle(&self) -> SceneHandle {
        self.handle.clone()
    }

    /// The tick scheduler. Never auto-started; the usual pattern is a
    /// connection listener that starts it on the first viewer.
    pub fn ticker(&self) -> Ticker {
        self.ticker.clone()
    }

    pub fn register_tick_listener(&self, listener: Box<dyn TickListener>) {
        self.ticker.register_tick_listener(listener);
    }

    pub fn register_connection_listener(&self, listener: Box<dyn ConnectionListener>) {
        self.conn_listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(listener);
    }

    // Producer API, delegated to the handle.

    pub fn upsert(
        &self,
        id: impl Into<String>,
        geometry: Geometry,
        transform: Transform,
        color: Color,
    ) {
        self.handle.upsert(id, geometry, transform, color);
    }

    pub fn remove(&self, id: &str) {
        self.handle.remove(id);
    }

    pub fn clear(&self) {
        self.handle.clear();
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        self.handle.snapshot()
    }

    pub fn set_autoflush(&self, enabled: bool) {
        self.handle.set_autoflush(enabled);
    }

    pub fn flush(&self) -> usize {
        self.handle.flush()
    }

    pub fn viewer_count(&self) -> usize {
        self.handle.viewer_count()
    }

    /// Binds the listener and spawns the accept loop. Returns the bound
    /// address (ephemeral ports supported for tests).
    pub async fn serve(&mut self) -> anyhow::Result<SocketAddr> {
        let addr: SocketAddr = self.cfg.listen_addr.parse().context("parse listen_addr")?;
        let listener = FrameListener::bind(addr).await?;
        let local = listener.local_addr()?;
        self.local_addr = Some(local);
        self.serving.store(true, Ordering::SeqCst);
        info!(%local, tick_hz = self.cfg.tick_hz, "scene server listening");

        let handle = self.handle.clone();
        let conn_listeners = Arc::clone(&self.conn_listeners);
        let shutdown = Arc::clone(&self.shutdown);
        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            handle,
            conn_listeners,
            shutdown,
        )));
        Ok(local)
    }

    /// Returns the bound address once serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stops the accept loop, closes every session, and stops the ticker.
    /// The only fatal path in the system is this explicit shutdown.
    pub fn stop_serving(&mut self) {
        if !self.serving.swap(false, Ordering::SeqCst) {
            return;
        }
        self.ticker.stop();
        self.shutdown.notify_waiters();
        self.handle.lock().broadcast.shutdown();
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
        info!("scene server stopped");
    }

    /// Blocks the caller until `stop_serving`.
    pub async fn block_while_serving(&self) {
        loop {
            let notified = self.shutdown.notified();
            if !self.serving.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

async fn accept_loop(
    listener: FrameListener,
    handle: SceneHandle,
    conn_listeners: Arc<Mutex<Vec<Box<dyn ConnectionListener>>>>,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((conn, peer)) => {
                    match admit(conn, &handle).await {
                        Ok(session) => notify_connected(&conn_listeners, session),
                        Err(error) => warn!(%peer, %error, "viewer handshake failed"),
                    }
                }
                Err(error) => warn!(%error, "accept failed"),
            },
            _ = shutdown.notified() => break,
        }
    }
    debug!("accept loop exited");
}

/// Handshake + registration. The viewer is synced from the baseline (the
/// last-broadcast state), so its first frame is a pure Create batch and
/// every later Update/Delete refers to an identifier it has seen.
async fn admit(mut conn: FrameConn, handle: &SceneHandle) -> anyhow::Result<SessionId> {
    let hello = conn
        .recv_timeout(HANDSHAKE_TIMEOUT)
        .await?
        .context("handshake timed out")?;
    match hello {
        WireMsg::Hello { protocol } if protocol == PROTOCOL_VERSION => {}
        WireMsg::Hello { protocol } => {
            anyhow::bail!("protocol mismatch: viewer {protocol}, server {PROTOCOL_VERSION}")
        }
        other => anyhow::bail!("unexpected handshake msg: {other:?}"),
    }

    let id = SessionId::new_unique();
    conn.send(&WireMsg::Welcome { session_id: id }).await?;

    let mut inner = handle.lock();
    let snapshot_ops = inner.baseline.as_creates();
    inner.broadcast.connect(id, conn, snapshot_ops);
    Ok(id)
}

fn notify_connected(
    conn_listeners: &Arc<Mutex<Vec<Box<dyn ConnectionListener>>>>,
    session: SessionId,
) {
    let mut listeners = conn_listeners.lock().unwrap_or_else(|p| p.into_inner());
    for listener in listeners.iter_mut() {
        if let Err(error) = listener.on_connect(session) {
            warn!(session = ?session, %error, "connection listener failed");
        }
    }
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(tick_hz: u32) -> anyhow::Result<(SceneServer, SocketAddr)> {
    let cfg = ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        tick_hz,
        ..Default::default()
    };
    let mut server = SceneServer::new(cfg);
    let addr = server.serve().await?;
    Ok((server, addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_shared::math::Vec3;

    fn sphere_at(x: f32) -> (Geometry, Transform, Color) {
        (
            Geometry::Sphere { radius: 1.0 },
            Transform::at(Vec3::new(x, 0.0, 0.0)),
            Color::RED,
        )
    }

    #[test]
    fn autoflush_on_publishes_each_mutation() {
        let server = SceneServer::new(ServerConfig::default());
        let (g, t, c) = sphere_at(0.0);
        server.upsert("ball", g, t, c);
        let handle = server.handle();
        assert!(!handle.is_dirty());
        assert_eq!(handle.flush(), 0);
    }

    #[test]
    fn autoflush_off_accumulates_until_flush() {
        let server = SceneServer::new(ServerConfig::default());
        server.set_autoflush(false);
        let handle = server.handle();

        let (g, t, c) = sphere_at(0.0);
        handle.upsert("ball", g, t, c);
        assert!(handle.is_dirty());

        let (g, t2, c) = sphere_at(1.0);
        handle.upsert("ball", g, t2, c);
        // Two upserts of a new object collapse to one Create.
        assert_eq!(handle.flush(), 1);
        assert!(!handle.is_dirty());
    }

    #[test]
    fn creates_and_deletes_in_one_batch_cancel_out() {
        let server = SceneServer::new(ServerConfig::default());
        server.set_autoflush(false);

        for i in 0..8 {
            let (g, t, c) = sphere_at(i as f32);
            server.upsert(format!("arrow{i}"), g, t, c);
        }
        for i in 0..8 {
            server.remove(&format!("arrow{i}"));
        }
        assert_eq!(server.flush(), 0);
    }

    #[test]
    fn reenabling_autoflush_flushes_pending() {
        let server = SceneServer::new(ServerConfig::default());
        server.set_autoflush(false);
        let (g, t, c) = sphere_at(0.0);
        server.upsert("ball", g, t, c);
        assert!(server.handle().is_dirty());

        server.set_autoflush(true);
        assert!(!server.handle().is_dirty());
    }
}
