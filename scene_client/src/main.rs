//! Headless viewer binary.
//!
//! Usage:
//!   cargo run -p scene_client -- [--addr 127.0.0.1:9070]
//!
//! Connects to a scene server and logs each received batch; useful for
//! smoke-testing a server without a real renderer.

use std::env;
use std::net::SocketAddr;

use anyhow::Context;
use scene_client::ViewerClient;
use tracing::info;

fn parse_addr() -> String {
    let args: Vec<String> = env::args().collect();
    let mut addr = "127.0.0.1:9070".to_string();
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--addr" && i + 1 < args.len() {
            addr = args[i + 1].clone();
            i += 2;
        } else {
            i += 1;
        }
    }
    addr
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let addr: SocketAddr = parse_addr().parse().context("parse --addr")?;
    let mut client = ViewerClient::connect(addr).await?;
    info!(session = ?client.session_id, "streaming; Ctrl-C to quit");

    loop {
        let applied = client.recv().await?;
        info!(
            applied,
            objects = client.scene().len(),
            total = client.ops_applied(),
            "batch"
        );
    }
}
