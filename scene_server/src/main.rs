//! Standalone scene server binary.
//!
//! Usage:
//!   cargo run -p scene_server -- [--addr 127.0.0.1:9070] [--tick-hz 50]
//!
//! Serves a small demo scene (ground slab plus a bouncing ball animated by
//! a tick listener). The ticker starts when the first viewer connects and
//! the process runs until Ctrl-C.

use std::env;
use std::time::Duration;

use anyhow::Context;
use scene_server::server::SceneServer;
use scene_shared::config::ServerConfig;
use scene_shared::math::Vec3;
use scene_shared::net::SessionId;
use scene_shared::scene::{Color, Geometry, Transform};
use tracing::info;

fn parse_args() -> ServerConfig {
    let mut cfg = ServerConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.listen_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(50);
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    info!(addr = %cfg.listen_addr, tick_hz = cfg.tick_hz, "starting scene server");

    let mut server = SceneServer::new(cfg);

    // Demo scene: a ground slab and a ball the tick listener animates.
    server.upsert(
        "ground",
        Geometry::Cuboid {
            half_extents: Vec3::new(5.0, 0.1, 5.0),
        },
        Transform::default(),
        Color::GRAY,
    );
    server.upsert(
        "ball",
        Geometry::Sphere { radius: 0.5 },
        Transform::at(Vec3::new(0.0, 2.0, 0.0)),
        Color::RED,
    );

    let handle = server.handle();
    server.register_tick_listener(Box::new(move |now: Duration| -> anyhow::Result<()> {
        let t = now.as_secs_f32();
        let y = 0.6 + 1.5 * t.sin().abs();
        handle.upsert(
            "ball",
            Geometry::Sphere { radius: 0.5 },
            Transform::at(Vec3::new(0.0, y, 0.0)),
            Color::RED,
        );
        Ok(())
    }));

    // Bind tick activity to demand: the clock starts with the first viewer.
    let ticker = server.ticker();
    server.register_connection_listener(Box::new(move |session: SessionId| -> anyhow::Result<()> {
        info!(session = ?session, "viewer connected, starting ticker");
        ticker.start();
        Ok(())
    }));

    let local = server.serve().await.context("serve")?;
    info!(%local, "scene server ready");

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    server.stop_serving();
    Ok(())
}
