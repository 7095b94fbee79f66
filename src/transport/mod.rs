// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Transports: LiveKit room management and the local WebSocket audio bridge.

pub mod livekit;
pub mod websocket;

pub use livekit::RoomSession;
pub use websocket::{BridgeServer, PeerHandler};
