// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! LiveKit room bootstrapping.
//!
//! The agent acts as a server-side participant: it creates (or reuses) a
//! room through the Room Service API and mints join tokens for itself and
//! for the browser peer. Credential problems surface here, before any media
//! flows, so a misconfigured deployment fails at startup rather than on the
//! first turn.

use std::time::Duration;

use livekit_api::access_token::{AccessToken, VideoGrants};
use livekit_api::services::room::{CreateRoomOptions, RoomClient};
use livekit_protocol::Room;

use crate::config::AgentConfig;
use crate::error::AgentError;

/// Join token TTL. Dev sessions are short-lived; an hour is plenty.
const TOKEN_TTL: Duration = Duration::from_secs(3600);

/// A created LiveKit room plus the credentials needed to join it.
pub struct RoomSession {
    server_url: String,
    api_key: String,
    api_secret: String,
    room_client: RoomClient,
    room_name: String,
    room_info: Room,
}

impl RoomSession {
    /// Validate credentials against the LiveKit server and create the room.
    ///
    /// `create_room` is idempotent for an existing room name, so restarting
    /// the agent against the same room reuses it. Any rejection from the
    /// server is a fatal startup error; there is no retry.
    pub async fn connect(config: &AgentConfig, room_name: &str) -> Result<Self, AgentError> {
        let room_client = RoomClient::with_api_key(
            &config.livekit_url,
            &config.livekit_api_key,
            &config.livekit_api_secret,
        );

        let room_info = room_client
            .create_room(room_name, CreateRoomOptions::default())
            .await
            .map_err(|e| AgentError::RoomService(format!("cannot create room {room_name:?}: {e}")))?;

        tracing::info!(
            room = room_name,
            sid = %room_info.sid,
            url = %config.livekit_url,
            "LiveKit room ready"
        );

        Ok(Self {
            server_url: config.livekit_url.clone(),
            api_key: config.livekit_api_key.clone(),
            api_secret: config.livekit_api_secret.clone(),
            room_client,
            room_name: room_name.to_string(),
            room_info,
        })
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Server-assigned room SID.
    pub fn room_sid(&self) -> &str {
        &self.room_info.sid
    }

    /// Mint a join token for the given participant identity.
    pub fn join_token(&self, identity: &str, display_name: &str) -> Result<String, AgentError> {
        let token = AccessToken::with_api_key(&self.api_key, &self.api_secret)
            .with_identity(identity)
            .with_name(display_name)
            .with_grants(VideoGrants {
                room_join: true,
                room: self.room_name.clone(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(TOKEN_TTL);
        Ok(token.to_jwt()?)
    }

    /// Token for the agent's own server-side participant.
    pub fn agent_token(&self) -> Result<String, AgentError> {
        self.join_token("voicewire-agent", "Voicewire Agent")
    }

    /// Token handed to the browser playground.
    pub fn browser_token(&self) -> Result<String, AgentError> {
        self.join_token("playground-user", "Playground User")
    }

    /// Number of participants currently in the room. A room the server has
    /// already pruned counts as empty.
    pub async fn participant_count(&self) -> Result<u32, AgentError> {
        match self.room_client.list_participants(&self.room_name).await {
            Ok(participants) => Ok(participants.len() as u32),
            Err(_) => Ok(0),
        }
    }
}

impl std::fmt::Debug for RoomSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("server_url", &self.server_url)
            .field("room_name", &self.room_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}
