// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Error types for agent startup and session management.

use thiserror::Error;

/// Errors that prevent a session from starting or force it to end.
///
/// Per-turn failures (a dropped STT socket, a failed completion request) are
/// not represented here; those surface inside the pipeline as non-fatal
/// `ErrorFrame`s and abort only the turn in flight.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("LiveKit token error: {0}")]
    LiveKit(#[from] livekit_api::access_token::AccessTokenError),

    #[error("LiveKit room service error: {0}")]
    RoomService(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("model download error: {0}")]
    Model(#[from] crate::audio::models::ModelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
