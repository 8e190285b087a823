//! Soak runner: one server, several viewers, a few hundred ticks.
//!
//! Exercises the full streaming path end to end and asserts that every
//! viewer's mirror converges to the authoritative snapshot.
//!
//! Usage:
//!   cargo run -p scene_tests --bin soak_runner -- [ticks] [viewers]

use std::time::{Duration, Instant};

use scene_client::ViewerClient;
use scene_server::server::bind_ephemeral;
use scene_shared::math::Vec3;
use scene_shared::net::SessionId;
use scene_shared::scene::{Color, Geometry, Transform};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let ticks: u32 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(200);
    let viewers: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(3);

    println!("scene-streaming soak runner");
    println!("  ticks:   {ticks}");
    println!("  viewers: {viewers}");

    let started = Instant::now();
    let (mut server, addr) = bind_ephemeral(200).await?;

    server.upsert(
        "ground",
        Geometry::Cuboid {
            half_extents: Vec3::new(5.0, 0.1, 5.0),
        },
        Transform::default(),
        Color::GRAY,
    );

    // Producer: moves a ball and re-draws a transient contact marker each
    // tick, batched so the marker costs one operation per frame.
    let handle = server.handle();
    handle.set_autoflush(false);
    server.register_tick_listener(Box::new(move |now: Duration| -> anyhow::Result<()> {
        let t = now.as_secs_f32();
        handle.upsert(
            "ball",
            Geometry::Sphere { radius: 0.5 },
            Transform::at(Vec3::new(t.sin(), 0.6 + t.cos().abs(), 0.0)),
            Color::RED,
        );
        handle.remove("contact");
        handle.upsert(
            "contact",
            Geometry::Line {
                points: vec![Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0)],
            },
            Transform::default(),
            Color::GREEN,
        );
        handle.flush();
        Ok(())
    }));

    let ticker = server.ticker();
    let trigger = server.ticker();
    server.register_connection_listener(Box::new(
        move |_session: SessionId| -> anyhow::Result<()> {
            trigger.start();
            Ok(())
        },
    ));

    let mut mirrors = Vec::new();
    for _ in 0..viewers {
        mirrors.push(ViewerClient::connect(addr).await?);
    }

    // 200 Hz clock: wait out the requested number of ticks, then freeze.
    tokio::time::sleep(Duration::from_millis(5 * ticks as u64 + 100)).await;
    ticker.stop();
    // Let any in-flight tick finish before freezing the reference state.
    tokio::time::sleep(Duration::from_millis(50)).await;
    server.flush();

    let mut failures = 0;
    let authoritative = server.snapshot();
    for (i, mirror) in mirrors.iter_mut().enumerate() {
        mirror.drain(Duration::from_millis(300)).await?;
        let ok = *mirror.scene() == authoritative;
        println!(
            "  viewer {i}: {} ({} ops applied, {} objects)",
            if ok { "consistent" } else { "DIVERGED" },
            mirror.ops_applied(),
            mirror.scene().len(),
        );
        if !ok {
            failures += 1;
        }
    }

    server.stop_serving();
    println!(
        "done in {:.2}s: {}/{} viewers consistent, ticker failures: {}",
        started.elapsed().as_secs_f64(),
        viewers - failures,
        viewers,
        ticker.failure_count(),
    );

    if failures > 0 {
        anyhow::bail!("{failures} viewer(s) diverged");
    }
    Ok(())
}
