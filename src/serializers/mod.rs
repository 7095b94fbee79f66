// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Frame serialization for WebSocket transports.

pub mod json;

use crate::frames::{FrameEnum, StartFrame};

/// Serialized frame data - either text or binary.
pub enum SerializedFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Converts pipeline frames to and from a wire representation.
///
/// The transport calls `serialize` for each frame it is about to send to the
/// remote peer and `deserialize` for each message it receives. Returning
/// `None` from either direction drops the frame/message silently; frames a
/// protocol has no representation for simply never reach the wire.
pub trait FrameSerializer: Send + Sync {
    /// Called once when the transport starts, with the negotiated sample
    /// rates. Most serializers need nothing here.
    fn setup(&mut self, _start: &StartFrame) {}

    /// Serialize a frame to its wire format, or `None` to skip it.
    fn serialize(&self, frame: &FrameEnum) -> Option<SerializedFrame>;

    /// Deserialize incoming wire data to a frame, or `None` to ignore it.
    fn deserialize(&self, data: &[u8]) -> Option<FrameEnum>;
}
