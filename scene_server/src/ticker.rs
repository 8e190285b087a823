//! Fixed-interval tick scheduler.
//!
//! A `Ticker` fires its registered `TickListener`s at a fixed interval on a
//! background tokio task. It never auto-starts; the documented trigger is a
//! connection listener calling `start` when the first viewer arrives.
//!
//! Semantics:
//! - States are Stopped and Running; construction leaves it Stopped.
//! - `start` is idempotent and fires the first tick one full interval after
//!   the call, never immediately.
//! - `stop` takes effect before the next scheduled firing; an in-flight
//!   listener invocation runs to completion. The ticker can be restarted.
//! - Missed ticks are skipped; two ticks never run concurrently.
//! - A listener error is logged and counted, and the clock keeps ticking.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::listener::TickListener;

struct TickerInner {
    interval: Duration,
    running: AtomicBool,
    stop: Notify,
    listeners: Mutex<Vec<Box<dyn TickListener>>>,
    failures: AtomicU64,
    /// Bumped on every `start`. A run task exits as soon as the stored
    /// generation is no longer its own, so a stop/restart while a fire is
    /// in flight cannot leave the superseded task ticking beside the new
    /// one (the stale task would otherwise read `running == true` again).
    generation: AtomicU64,
    /// Set on the first `start`; tick timestamps are measured from here.
    epoch: Mutex<Option<Instant>>,
}

/// Cheaply cloneable handle to one scheduler. Clones share state, so a
/// connection listener can hold one and start the clock on demand.
#[derive(Clone)]
pub struct Ticker {
    inner: Arc<TickerInner>,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(TickerInner {
                interval,
                running: AtomicBool::new(false),
                stop: Notify::new(),
                listeners: Mutex::new(Vec::new()),
                failures: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                epoch: Mutex::new(None),
            }),
        }
    }

    /// Registers a listener; listeners fire in registration order.
    pub fn register_tick_listener(&self, listener: Box<dyn TickListener>) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(listener);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Total listener invocations that returned an error. Non-fatal, but
    /// observable by callers that want to notice a misbehaving producer.
    pub fn failure_count(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    /// Stopped -> Running. No-op when already Running. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut epoch = self
                .inner
                .epoch
                .lock()
                .unwrap_or_else(|p| p.into_inner());
            epoch.get_or_insert_with(Instant::now);
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(run(inner, generation));
    }

    /// Running -> Stopped. Effective before the next scheduled firing; an
    /// in-flight listener invocation runs to completion.
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            self.inner.stop.notify_waiters();
        }
    }
}

async fn run(inner: Arc<TickerInner>, generation: u64) {
    let first = tokio::time::Instant::now() + inner.interval;
    let mut interval = tokio::time::interval_at(first, inner.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if !inner.running.load(Ordering::SeqCst)
                    || inner.generation.load(Ordering::SeqCst) != generation
                {
                    break;
                }
                fire(&inner);
            }
            _ = inner.stop.notified() => break,
        }
    }
}

fn fire(inner: &TickerInner) {
    let now = {
        let epoch = inner.epoch.lock().unwrap_or_else(|p| p.into_inner());
        epoch.map(|e| e.elapsed()).unwrap_or_default()
    };
    let mut listeners = inner
        .listeners
        .lock()
        .unwrap_or_else(|p| p.into_inner());
    for listener in listeners.iter_mut() {
        if let Err(error) = listener.on_tick(now) {
            inner.failures.fetch_add(1, Ordering::Relaxed);
            warn!(%error, "tick listener failed, clock continues");
        }
    }
}
