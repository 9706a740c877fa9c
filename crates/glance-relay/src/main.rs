#![forbid(unsafe_code)]

//! Glance Relay - blind payload store for session signaling.
//!
//! The relay:
//! 1. Hands out short-lived six-digit room codes
//! 2. Holds one offer and one answer payload per room
//! 3. Never decodes payloads (they stay opaque end to end)

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use glance_relay::store::{DEFAULT_PURGE_INTERVAL, DEFAULT_ROOM_TTL};
use glance_relay::{router, spawn_purge_loop, RoomStore};

#[derive(Parser, Debug)]
#[command(name = "glance-relay")]
#[command(about = "Glance relay - moves session payloads between peers")]
struct Args {
    /// HTTP listen address
    #[arg(long, default_value = "127.0.0.1:8787")]
    listen: SocketAddr,

    /// Room lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_ROOM_TTL.as_secs())]
    room_ttl: u64,

    /// Seconds between expired-room sweeps
    #[arg(long, default_value_t = DEFAULT_PURGE_INTERVAL.as_secs())]
    purge_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    glance_common::init_tracing();
    let args = Args::parse();

    let store = RoomStore::new(Duration::from_secs(args.room_ttl));
    let purge = spawn_purge_loop(store.clone(), Duration::from_secs(args.purge_interval));

    let listener = TcpListener::bind(args.listen).await?;
    info!(listen = %args.listen, room_ttl_secs = args.room_ttl, "relay listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    purge.abort();
    Ok(())
}
