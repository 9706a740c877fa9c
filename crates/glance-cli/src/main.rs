//! Glance CLI: share a screen or join a share from the terminal.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use glance_common::protocol::PayloadSlot;
use glance_common::RoomCode;
use glance_core::session::{ConnectionSession, Role, SessionConfig, SessionEvent, SessionState};
use glance_core::media::ScreenConfig;
use glance_rtc::{RtcConfig, RtcTransportFactory, SyntheticMediaSource};
use glance_signaling::{RelayClient, SignalingChannel};

#[derive(Parser, Debug)]
#[command(name = "glance")]
#[command(about = "Glance: peer-to-peer screen sharing")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct CommonOpts {
    /// Relay base URL; omit to exchange tokens by hand
    #[arg(long)]
    relay: Option<String>,

    /// STUN server URLs (repeatable); empty keeps candidates local
    #[arg(long = "stun")]
    stun_servers: Vec<String>,

    /// Skip camera capture
    #[arg(long)]
    no_camera: bool,

    /// Skip microphone capture
    #[arg(long)]
    no_mic: bool,

    /// Seconds to wait for the peer before giving up
    #[arg(long, default_value_t = 120)]
    wait_secs: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Share your screen and wait for a viewer
    Share {
        #[command(flatten)]
        common: CommonOpts,

        /// Also share system audio with the screen
        #[arg(long)]
        system_audio: bool,
    },

    /// Join an existing share
    Join {
        #[command(flatten)]
        common: CommonOpts,

        /// Six-digit room code (relay mode only)
        code: Option<String>,
    },

    /// Show version information
    Version,
}

fn build_session(role: Role, common: &CommonOpts, screen: ScreenConfig) -> ConnectionSession {
    let mut config = SessionConfig {
        screen,
        ..SessionConfig::default()
    };
    if common.no_camera {
        config.camera = None;
    }
    if common.no_mic {
        config.microphone = false;
    }

    let rtc = if common.stun_servers.is_empty() {
        RtcConfig::default()
    } else {
        RtcConfig {
            ice_servers: common.stun_servers.clone(),
        }
    };

    ConnectionSession::new(
        role,
        config,
        Arc::new(SyntheticMediaSource::new()),
        RtcTransportFactory::new(rtc),
    )
}

async fn read_token(prompt: &str) -> Result<String> {
    println!("{prompt}");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading token from stdin")?;
    let token = line.trim().to_string();
    if token.is_empty() {
        return Err(anyhow!("no token entered"));
    }
    Ok(token)
}

async fn run_share(common: CommonOpts, system_audio: bool) -> Result<()> {
    let session = build_session(
        Role::Host,
        &common,
        ScreenConfig {
            capture_system_audio: system_audio,
        },
    );

    session.acquire_media().await?;
    let offer = session.start_offer().await?;
    let wait = Duration::from_secs(common.wait_secs);

    let answer = match &common.relay {
        Some(relay) => {
            let client = RelayClient::new(relay);
            let code = client.create_room().await?;
            let channel = client.channel(code, PayloadSlot::Offer);
            channel.publish(offer.as_str()).await?;
            println!("Room code: {code}");
            println!("Waiting for a viewer to join...");
            let answer = channel.wait_for_peer(wait).await?;
            if let Err(e) = client.release_room(code).await {
                warn!(error = %e, "failed to release room");
            }
            answer
        }
        None => {
            println!("Send this offer to the viewer:\n{offer}");
            read_token("Paste the viewer's answer and press enter:").await?
        }
    };

    session.accept_remote(&answer).await?;
    run_until_done(session).await
}

async fn run_join(common: CommonOpts, code: Option<String>) -> Result<()> {
    let session = build_session(Role::Viewer, &common, ScreenConfig::default());
    session.acquire_media().await?;
    let wait = Duration::from_secs(common.wait_secs);

    match (&common.relay, code) {
        (Some(relay), Some(code)) => {
            let code: RoomCode = code.parse().map_err(|e| anyhow!("{e}"))?;
            let client = RelayClient::new(relay);
            let channel = client.channel(code, PayloadSlot::Answer);
            println!("Fetching offer for room {code}...");
            let offer = channel.wait_for_peer(wait).await?;
            let answer = session
                .accept_remote(&offer)
                .await?
                .ok_or_else(|| anyhow!("viewer produced no answer payload"))?;
            channel.publish(answer.as_str()).await?;
        }
        (Some(_), None) => return Err(anyhow!("a room code is required in relay mode")),
        (None, _) => {
            let offer = read_token("Paste the host's offer and press enter:").await?;
            let answer = session
                .accept_remote(&offer)
                .await?
                .ok_or_else(|| anyhow!("viewer produced no answer payload"))?;
            println!("Send this answer back to the host:\n{answer}");
        }
    }

    run_until_done(session).await
}

/// Print session activity until the share ends or the user interrupts.
async fn run_until_done(session: ConnectionSession) -> Result<()> {
    let mut events = session.subscribe();
    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break Ok(());
            }
            event = events.recv() => match event {
                Ok(SessionEvent::StateChanged(state)) => {
                    println!("Session: {state:?}");
                    match state {
                        SessionState::Failed => break Err(anyhow!("session failed")),
                        SessionState::Closed => break Ok(()),
                        _ => {}
                    }
                }
                Ok(SessionEvent::TrackClassified(routed)) => {
                    println!(
                        "Track: {:?} ({:?}, group {:?})",
                        routed.classification, routed.track.kind, routed.group
                    );
                }
                Ok(SessionEvent::GatheringResolved { complete }) => {
                    if !complete {
                        warn!("shipped payload before gathering finished");
                    }
                }
                Ok(SessionEvent::Error(message)) => {
                    warn!(%message, "session error");
                }
                Ok(SessionEvent::PayloadReady(_)) => {}
                Err(_) => break Ok(()),
            }
        }
    };
    session.close().await;
    outcome
}

#[tokio::main]
async fn main() -> Result<()> {
    glance_common::init_tracing();
    let args = Args::parse();

    match args.command {
        Command::Share {
            common,
            system_audio,
        } => run_share(common, system_audio).await,
        Command::Join { common, code } => run_join(common, code).await,
        Command::Version => {
            println!("glance {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
