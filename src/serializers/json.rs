// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! JSON frame serializer.
//!
//! Each message is a JSON object with a `type` field identifying the frame
//! kind, plus frame-specific fields. Audio payloads are base64-encoded so the
//! whole protocol stays text-based:
//!
//! ```json
//! { "type": "text", "text": "Hello world" }
//! { "type": "transcription", "text": "...", "user_id": "...", "timestamp": "..." }
//! { "type": "audio_input",  "audio": "<base64>", "sample_rate": 16000, "num_channels": 1 }
//! { "type": "audio_output", "audio": "<base64>", "sample_rate": 24000, "num_channels": 1 }
//! { "type": "start", "audio_in_sample_rate": 16000, "audio_out_sample_rate": 24000 }
//! { "type": "end" }
//! { "type": "cancel" }
//! { "type": "error", "error": "...", "fatal": false }
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::frames::*;
use crate::serializers::{FrameSerializer, SerializedFrame};
use crate::utils::{decode_base64, encode_base64};

/// Serializes pipeline frames to the JSON wire format above.
///
/// Outbound it handles `Text`, `Transcription`, `TTSAudioRaw`, `Start`,
/// `End`, `Cancel` and `Error`; everything else is skipped. Inbound it
/// accepts `text`, `audio_input`, `end` and `cancel` messages.
#[derive(Debug, Default, Clone)]
pub struct JsonFrameSerializer;

impl JsonFrameSerializer {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct WireOut<'a, T: Serialize> {
    #[serde(rename = "type")]
    frame_type: &'a str,
    #[serde(flatten)]
    payload: T,
}

#[derive(Serialize)]
struct TextOut<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct TranscriptionOut<'a> {
    text: &'a str,
    user_id: &'a str,
    timestamp: &'a str,
}

#[derive(Serialize)]
struct AudioOut {
    audio: String,
    sample_rate: u32,
    num_channels: u32,
}

#[derive(Serialize)]
struct StartOut {
    audio_in_sample_rate: u32,
    audio_out_sample_rate: u32,
}

#[derive(Serialize)]
struct ErrorOut<'a> {
    error: &'a str,
    fatal: bool,
}

#[derive(Serialize)]
struct EmptyOut {}

#[derive(Deserialize)]
struct WireIn {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    sample_rate: Option<u32>,
    #[serde(default)]
    num_channels: Option<u32>,
}

fn to_json<T: Serialize>(frame_type: &str, payload: T) -> Option<SerializedFrame> {
    match serde_json::to_string(&WireOut {
        frame_type,
        payload,
    }) {
        Ok(json) => Some(SerializedFrame::Text(json)),
        Err(e) => {
            warn!("failed to serialize {frame_type} frame: {e}");
            None
        }
    }
}

impl FrameSerializer for JsonFrameSerializer {
    fn serialize(&self, frame: &FrameEnum) -> Option<SerializedFrame> {
        match frame {
            FrameEnum::Text(f) => to_json("text", TextOut { text: &f.text }),
            FrameEnum::Transcription(f) => to_json(
                "transcription",
                TranscriptionOut {
                    text: &f.text,
                    user_id: &f.user_id,
                    timestamp: &f.timestamp,
                },
            ),
            FrameEnum::TTSAudioRaw(f) => to_json(
                "audio_output",
                AudioOut {
                    audio: encode_base64(&f.audio.audio),
                    sample_rate: f.audio.sample_rate,
                    num_channels: f.audio.num_channels,
                },
            ),
            FrameEnum::Start(f) => to_json(
                "start",
                StartOut {
                    audio_in_sample_rate: f.audio_in_sample_rate,
                    audio_out_sample_rate: f.audio_out_sample_rate,
                },
            ),
            FrameEnum::End(_) => to_json("end", EmptyOut {}),
            FrameEnum::Cancel(_) => to_json("cancel", EmptyOut {}),
            FrameEnum::Error(f) => to_json(
                "error",
                ErrorOut {
                    error: &f.error,
                    fatal: f.fatal,
                },
            ),
            _ => None,
        }
    }

    fn deserialize(&self, data: &[u8]) -> Option<FrameEnum> {
        let msg: WireIn = match serde_json::from_slice(data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("ignoring unparseable message: {e}");
                return None;
            }
        };

        match msg.frame_type.as_str() {
            "text" => {
                let text = msg.text?;
                Some(FrameEnum::Text(TextFrame::new(text)))
            }
            "audio_input" => {
                let audio = decode_base64(msg.audio.as_deref()?)?;
                Some(FrameEnum::InputAudioRaw(InputAudioRawFrame::new(
                    audio,
                    msg.sample_rate.unwrap_or(16000),
                    msg.num_channels.unwrap_or(1),
                )))
            }
            "end" => Some(FrameEnum::End(EndFrame::new())),
            "cancel" => Some(FrameEnum::Cancel(CancelFrame::new())),
            other => {
                warn!("ignoring message with unknown type {other:?}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn serialize_to_value(frame: &FrameEnum) -> Value {
        let serializer = JsonFrameSerializer::new();
        match serializer.serialize(frame) {
            Some(SerializedFrame::Text(json)) => {
                serde_json::from_str(&json).expect("valid json")
            }
            _ => panic!("expected text serialization"),
        }
    }

    #[test]
    fn text_frame_serializes_with_type_tag() {
        let value = serialize_to_value(&FrameEnum::Text(TextFrame::new("hello")));
        assert_eq!(value["type"], "text");
        assert_eq!(value["text"], "hello");
    }

    #[test]
    fn tts_audio_is_base64_encoded() {
        let frame = TTSAudioRawFrame::new(vec![0x01, 0x02, 0x03, 0x04], 24000, 1);
        let value = serialize_to_value(&FrameEnum::TTSAudioRaw(frame));
        assert_eq!(value["type"], "audio_output");
        assert_eq!(value["sample_rate"], 24000);
        let decoded = decode_base64(value["audio"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn start_frame_carries_sample_rates() {
        let value = serialize_to_value(&FrameEnum::Start(StartFrame::default()));
        assert_eq!(value["type"], "start");
        assert_eq!(value["audio_in_sample_rate"], 16000);
        assert_eq!(value["audio_out_sample_rate"], 24000);
    }

    #[test]
    fn error_frame_carries_fatal_flag() {
        let value =
            serialize_to_value(&FrameEnum::Error(ErrorFrame::new("tts unavailable", true)));
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"], "tts unavailable");
        assert_eq!(value["fatal"], true);
    }

    #[test]
    fn internal_frames_are_skipped() {
        let serializer = JsonFrameSerializer::new();
        assert!(serializer
            .serialize(&FrameEnum::LLMRun(LLMRunFrame::new()))
            .is_none());
        assert!(serializer
            .serialize(&FrameEnum::UserStartedSpeaking(
                UserStartedSpeakingFrame::new()
            ))
            .is_none());
    }

    #[test]
    fn audio_input_deserializes_to_input_frame() {
        let serializer = JsonFrameSerializer::new();
        let json = format!(
            r#"{{"type": "audio_input", "audio": "{}", "sample_rate": 8000, "num_channels": 1}}"#,
            encode_base64(&[0xAA, 0xBB])
        );
        match serializer.deserialize(json.as_bytes()) {
            Some(FrameEnum::InputAudioRaw(f)) => {
                assert_eq!(f.audio.audio, vec![0xAA, 0xBB]);
                assert_eq!(f.audio.sample_rate, 8000);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn audio_input_defaults_sample_rate() {
        let serializer = JsonFrameSerializer::new();
        let json = format!(
            r#"{{"type": "audio_input", "audio": "{}"}}"#,
            encode_base64(&[0x00, 0x00])
        );
        match serializer.deserialize(json.as_bytes()) {
            Some(FrameEnum::InputAudioRaw(f)) => {
                assert_eq!(f.audio.sample_rate, 16000);
                assert_eq!(f.audio.num_channels, 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unknown_and_malformed_messages_are_ignored() {
        let serializer = JsonFrameSerializer::new();
        assert!(serializer
            .deserialize(br#"{"type": "bogus"}"#)
            .is_none());
        assert!(serializer.deserialize(b"not json at all").is_none());
        assert!(serializer
            .deserialize(br#"{"type": "audio_input", "audio": "!!!"}"#)
            .is_none());
    }
}
