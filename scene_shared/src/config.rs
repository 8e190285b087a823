//! Configuration system.
//!
//! Loads server configuration from JSON strings/files (file IO left to app).

use serde::{Deserialize, Serialize};

/// Root configuration for the scene-streaming server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address for viewer connections, e.g. `127.0.0.1:9070`.
    pub listen_addr: String,
    /// Fixed tick rate for the scheduler, in Hz.
    pub tick_hz: u32,
    /// Per-session transmit queue bound; a viewer that falls this many
    /// batches behind is disconnected as a slow consumer.
    #[serde(default = "default_session_queue")]
    pub session_queue: usize,
    /// Whether each mutation immediately diffs and publishes.
    #[serde(default = "default_autoflush")]
    pub autoflush: bool,
}

fn default_session_queue() -> usize {
    256
}

fn default_autoflush() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9070".to_string(),
            tick_hz: 50,
            session_queue: default_session_queue(),
            autoflush: default_autoflush(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Tick interval derived from `tick_hz`.
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg = ServerConfig::from_json_str(
            r#"{ "listen_addr": "127.0.0.1:0", "tick_hz": 100 }"#,
        )
        .unwrap();
        assert_eq!(cfg.session_queue, 256);
        assert!(cfg.autoflush);
        assert_eq!(cfg.tick_interval(), std::time::Duration::from_millis(10));
    }
}
