// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Local WebSocket audio bridge for dev mode.
//!
//! The browser playground connects here and exchanges JSON-serialized frames
//! (base64 PCM audio) with the running agent. Only one peer is allowed at a
//! time; a second connection attempt is rejected with `409 Conflict` while a
//! session is active.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::Mutex;

use crate::error::AgentError;

/// Runs one agent session against a connected peer socket.
#[async_trait]
pub trait PeerHandler: Send + Sync + 'static {
    async fn handle(&self, socket: WebSocket);
}

#[derive(Clone)]
struct BridgeState {
    handler: Arc<dyn PeerHandler>,
    /// Held for the duration of a session; `try_lock` failure means busy.
    session_slot: Arc<Mutex<()>>,
}

/// Axum server exposing the `/ws` bridge endpoint.
pub struct BridgeServer {
    host: String,
    port: u16,
}

impl BridgeServer {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Bind and serve until the process is stopped. Each accepted peer runs
    /// through `handler`, one at a time.
    pub async fn serve(self, handler: Arc<dyn PeerHandler>) -> Result<(), AgentError> {
        let state = BridgeState {
            handler,
            session_slot: Arc::new(Mutex::new(())),
        };

        let app = Router::new()
            .route("/ws", get(handle_upgrade))
            .route("/healthz", get(|| async { "ok" }))
            .with_state(state);

        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AgentError::Transport(format!("invalid bridge address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "audio bridge listening");
        axum::serve(listener, app)
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))
    }
}

async fn handle_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<BridgeState>,
) -> impl IntoResponse {
    // The guard moves into the upgrade callback so the slot frees itself
    // when the session future completes.
    let Ok(guard) = state.session_slot.clone().try_lock_owned() else {
        tracing::warn!("rejecting bridge connection: session already active");
        return StatusCode::CONFLICT.into_response();
    };

    let handler = state.handler.clone();
    ws.on_upgrade(move |socket| async move {
        tracing::info!("bridge peer connected");
        handler.handle(socket).await;
        tracing::info!("bridge peer session ended");
        drop(guard);
    })
    .into_response()
}
