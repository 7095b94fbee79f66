// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Voicewire CLI.
//!
//! `voicewire dev` boots the agent against a LiveKit room and serves the
//! local browser playground bridge. `voicewire download-files` pre-fetches
//! model assets so dev sessions start without a download pause.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voicewire::agent::{Agent, AgentSession};
use voicewire::audio::models::ModelManager;
use voicewire::config::AgentConfig;
use voicewire::error::AgentError;
use voicewire::transport::livekit::RoomSession;
use voicewire::transport::websocket::BridgeServer;

#[derive(Parser)]
#[command(name = "voicewire", version, about = "Conversational voice agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent in dev mode with the local browser playground bridge.
    Dev {
        /// Bridge listen address.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Bridge listen port.
        #[arg(long, default_value_t = 8765)]
        port: u16,
        /// LiveKit room name.
        #[arg(long, default_value = "voicewire-dev")]
        room: String,
    },
    /// Download model assets (Silero VAD) into the local cache.
    DownloadFiles,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,voicewire=debug")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Dev { host, port, room } => run_dev(host, port, room).await?,
        Command::DownloadFiles => download_files().await?,
    }
    Ok(())
}

async fn run_dev(host: String, port: u16, room: String) -> Result<(), AgentError> {
    // Fail fast: every credential is checked before anything connects.
    let config = AgentConfig::from_env()?;

    let room_session = RoomSession::connect(&config, &room).await?;
    let browser_token = room_session.browser_token()?;
    tracing::info!(server = room_session.server_url(), room = %room, "LiveKit room ready");
    tracing::info!("browser join token: {browser_token}");
    tracing::info!("playground bridge: ws://{host}:{port}/ws");

    let session = Arc::new(AgentSession::new(config, Agent::default()).with_room(room_session));
    BridgeServer::new(host, port).serve(session).await
}

async fn download_files() -> Result<(), AgentError> {
    tracing::info!("fetching model files");
    let path = ModelManager::get_silero_vad().await?;
    tracing::info!(path = %path.display(), "Silero VAD model ready");
    Ok(())
}
