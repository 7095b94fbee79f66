// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Frame model for the voice pipeline.
//!
//! Every piece of information flowing through the pipeline is a [`FrameEnum`]
//! variant: audio chunks, transcriptions, LLM tokens, lifecycle signals.
//! Frames are plain structs matched exhaustively; there is no runtime
//! downcasting.
//!
//! Frames fall into three kinds:
//!
//! - **System**: lifecycle and speech events, delivered with priority.
//! - **Data**: ordered conversation content (text, audio, transcripts).
//! - **Control**: ordered boundary signals (response start/end, shutdown).

use std::fmt;

use crate::metrics::MetricsData;
use crate::utils::obj_id;

// ---------------------------------------------------------------------------
// Frame kinds
// ---------------------------------------------------------------------------

/// Categorizes a frame into one of the primary processing categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// High-priority lifecycle or speech event.
    System,
    /// Ordered conversation content.
    Data,
    /// Ordered control signal.
    Control,
}

// ---------------------------------------------------------------------------
// Embedded payload structs (not frames themselves)
// ---------------------------------------------------------------------------

/// Raw audio data embedded in audio frame types.
///
/// Audio is always 16-bit signed little-endian PCM.
#[derive(Debug, Clone)]
pub struct AudioRawData {
    /// Raw PCM bytes.
    pub audio: Vec<u8>,
    /// Sample rate in Hz (e.g. 16000, 24000).
    pub sample_rate: u32,
    /// Number of channels (1 = mono).
    pub num_channels: u32,
    /// Number of audio frames, computed from the byte length.
    pub num_frames: u32,
}

impl AudioRawData {
    /// Create new audio data, computing `num_frames` from the byte length.
    pub fn new(audio: Vec<u8>, sample_rate: u32, num_channels: u32) -> Self {
        let bytes_per_frame = (num_channels as usize).saturating_mul(2);
        let num_frames = if bytes_per_frame > 0 {
            (audio.len() / bytes_per_frame).min(u32::MAX as usize) as u32
        } else {
            0
        };
        Self {
            audio,
            sample_rate,
            num_channels,
            num_frames,
        }
    }
}

/// A function call requested by the LLM.
#[derive(Debug, Clone)]
pub struct FunctionCallFromLLM {
    /// Name of the tool to invoke.
    pub function_name: String,
    /// Vendor-assigned identifier for this call.
    pub tool_call_id: String,
    /// JSON arguments for the tool.
    pub arguments: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Common fields
// ---------------------------------------------------------------------------

/// Common fields stored in every frame struct.
#[derive(Debug, Clone)]
pub struct FrameFields {
    /// Unique numeric identifier for this frame instance.
    pub id: u64,
}

impl FrameFields {
    pub fn new() -> Self {
        Self { id: obj_id() }
    }
}

impl Default for FrameFields {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// System frames
// ---------------------------------------------------------------------------

/// Initial frame that starts pipeline processing and carries audio formats.
#[derive(Debug, Clone)]
pub struct StartFrame {
    pub fields: FrameFields,
    /// Sample rate of audio entering the pipeline.
    pub audio_in_sample_rate: u32,
    /// Sample rate of audio leaving the pipeline.
    pub audio_out_sample_rate: u32,
}

impl StartFrame {
    pub fn new(audio_in_sample_rate: u32, audio_out_sample_rate: u32) -> Self {
        Self {
            fields: FrameFields::new(),
            audio_in_sample_rate,
            audio_out_sample_rate,
        }
    }
}

impl Default for StartFrame {
    fn default() -> Self {
        Self::new(16000, 24000)
    }
}

/// Immediate pipeline cancellation request.
#[derive(Debug, Clone, Default)]
pub struct CancelFrame {
    pub fields: FrameFields,
}

impl CancelFrame {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Error notification. Non-fatal errors abort the current turn; fatal
/// errors end the session.
#[derive(Debug, Clone)]
pub struct ErrorFrame {
    pub fields: FrameFields,
    pub error: String,
    pub fatal: bool,
}

impl ErrorFrame {
    pub fn new(error: impl Into<String>, fatal: bool) -> Self {
        Self {
            fields: FrameFields::new(),
            error: error.into(),
            fatal,
        }
    }
}

/// The user began speaking.
#[derive(Debug, Clone, Default)]
pub struct UserStartedSpeakingFrame {
    pub fields: FrameFields,
}

impl UserStartedSpeakingFrame {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The user stopped speaking.
#[derive(Debug, Clone, Default)]
pub struct UserStoppedSpeakingFrame {
    pub fields: FrameFields,
}

impl UserStoppedSpeakingFrame {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Raw audio captured from the transport.
#[derive(Debug, Clone)]
pub struct InputAudioRawFrame {
    pub fields: FrameFields,
    pub audio: AudioRawData,
}

impl InputAudioRawFrame {
    pub fn new(audio: Vec<u8>, sample_rate: u32, num_channels: u32) -> Self {
        Self {
            fields: FrameFields::new(),
            audio: AudioRawData::new(audio, sample_rate, num_channels),
        }
    }
}

/// Metric payloads emitted by services.
#[derive(Debug, Clone)]
pub struct MetricsFrame {
    pub fields: FrameFields,
    pub data: Vec<MetricsData>,
}

impl MetricsFrame {
    pub fn new(data: Vec<MetricsData>) -> Self {
        Self {
            fields: FrameFields::new(),
            data,
        }
    }
}

/// The LLM requested one or more tool invocations.
#[derive(Debug, Clone)]
pub struct FunctionCallsStartedFrame {
    pub fields: FrameFields,
    pub function_calls: Vec<FunctionCallFromLLM>,
}

impl FunctionCallsStartedFrame {
    pub fn new(function_calls: Vec<FunctionCallFromLLM>) -> Self {
        Self {
            fields: FrameFields::new(),
            function_calls,
        }
    }
}

// ---------------------------------------------------------------------------
// Data frames
// ---------------------------------------------------------------------------

/// A chunk of text, e.g. one streamed LLM token or one aggregated sentence.
#[derive(Debug, Clone)]
pub struct TextFrame {
    pub fields: FrameFields,
    pub text: String,
}

impl TextFrame {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            fields: FrameFields::new(),
            text: text.into(),
        }
    }
}

/// A final transcription of user speech.
#[derive(Debug, Clone)]
pub struct TranscriptionFrame {
    pub fields: FrameFields,
    pub text: String,
    pub user_id: String,
    pub timestamp: String,
}

impl TranscriptionFrame {
    pub fn new(text: String, user_id: String, timestamp: String) -> Self {
        Self {
            fields: FrameFields::new(),
            text,
            user_id,
            timestamp,
        }
    }
}

/// A partial (still changing) transcription of user speech.
#[derive(Debug, Clone)]
pub struct InterimTranscriptionFrame {
    pub fields: FrameFields,
    pub text: String,
    pub user_id: String,
    pub timestamp: String,
}

impl InterimTranscriptionFrame {
    pub fn new(text: String, user_id: String, timestamp: String) -> Self {
        Self {
            fields: FrameFields::new(),
            text,
            user_id,
            timestamp,
        }
    }
}

/// Synthesized audio produced by the TTS service.
#[derive(Debug, Clone)]
pub struct TTSAudioRawFrame {
    pub fields: FrameFields,
    pub audio: AudioRawData,
}

impl TTSAudioRawFrame {
    pub fn new(audio: Vec<u8>, sample_rate: u32, num_channels: u32) -> Self {
        Self {
            fields: FrameFields::new(),
            audio: AudioRawData::new(audio, sample_rate, num_channels),
        }
    }
}

/// Result of a completed tool invocation, sent back to the LLM.
#[derive(Debug, Clone)]
pub struct FunctionCallResultFrame {
    pub fields: FrameFields,
    pub function_name: String,
    pub tool_call_id: String,
    pub arguments: serde_json::Value,
    pub result: serde_json::Value,
}

impl FunctionCallResultFrame {
    pub fn new(
        function_name: String,
        tool_call_id: String,
        arguments: serde_json::Value,
        result: serde_json::Value,
    ) -> Self {
        Self {
            fields: FrameFields::new(),
            function_name,
            tool_call_id,
            arguments,
            result,
        }
    }
}

/// Trigger an LLM inference over the current shared context.
#[derive(Debug, Clone, Default)]
pub struct LLMRunFrame {
    pub fields: FrameFields,
}

impl LLMRunFrame {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Control frames
// ---------------------------------------------------------------------------

/// Graceful pipeline shutdown request.
#[derive(Debug, Clone, Default)]
pub struct EndFrame {
    pub fields: FrameFields,
}

impl EndFrame {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The LLM started streaming a response.
#[derive(Debug, Clone, Default)]
pub struct LLMResponseStartFrame {
    pub fields: FrameFields,
}

impl LLMResponseStartFrame {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The LLM finished streaming a response.
#[derive(Debug, Clone, Default)]
pub struct LLMResponseEndFrame {
    pub fields: FrameFields,
}

impl LLMResponseEndFrame {
    pub fn new() -> Self {
        Self::default()
    }
}

/// TTS began synthesizing an utterance.
#[derive(Debug, Clone, Default)]
pub struct TTSStartedFrame {
    pub fields: FrameFields,
}

impl TTSStartedFrame {
    pub fn new() -> Self {
        Self::default()
    }
}

/// TTS finished synthesizing an utterance.
#[derive(Debug, Clone, Default)]
pub struct TTSStoppedFrame {
    pub fields: FrameFields,
}

impl TTSStoppedFrame {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// The frame enum
// ---------------------------------------------------------------------------

/// Concrete enum of all frame types in the pipeline.
#[derive(Debug)]
pub enum FrameEnum {
    // System
    Start(StartFrame),
    Cancel(CancelFrame),
    Error(ErrorFrame),
    UserStartedSpeaking(UserStartedSpeakingFrame),
    UserStoppedSpeaking(UserStoppedSpeakingFrame),
    InputAudioRaw(InputAudioRawFrame),
    Metrics(MetricsFrame),
    FunctionCallsStarted(FunctionCallsStartedFrame),

    // Data
    Text(TextFrame),
    Transcription(TranscriptionFrame),
    InterimTranscription(InterimTranscriptionFrame),
    TTSAudioRaw(TTSAudioRawFrame),
    FunctionCallResult(FunctionCallResultFrame),
    LLMRun(LLMRunFrame),

    // Control
    End(EndFrame),
    LLMResponseStart(LLMResponseStartFrame),
    LLMResponseEnd(LLMResponseEndFrame),
    TTSStarted(TTSStartedFrame),
    TTSStopped(TTSStoppedFrame),
}

impl FrameEnum {
    /// Unique frame ID.
    pub fn id(&self) -> u64 {
        match self {
            Self::Start(f) => f.fields.id,
            Self::Cancel(f) => f.fields.id,
            Self::Error(f) => f.fields.id,
            Self::UserStartedSpeaking(f) => f.fields.id,
            Self::UserStoppedSpeaking(f) => f.fields.id,
            Self::InputAudioRaw(f) => f.fields.id,
            Self::Metrics(f) => f.fields.id,
            Self::FunctionCallsStarted(f) => f.fields.id,
            Self::Text(f) => f.fields.id,
            Self::Transcription(f) => f.fields.id,
            Self::InterimTranscription(f) => f.fields.id,
            Self::TTSAudioRaw(f) => f.fields.id,
            Self::FunctionCallResult(f) => f.fields.id,
            Self::LLMRun(f) => f.fields.id,
            Self::End(f) => f.fields.id,
            Self::LLMResponseStart(f) => f.fields.id,
            Self::LLMResponseEnd(f) => f.fields.id,
            Self::TTSStarted(f) => f.fields.id,
            Self::TTSStopped(f) => f.fields.id,
        }
    }

    /// Human-readable name derived from the enum variant.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "StartFrame",
            Self::Cancel(_) => "CancelFrame",
            Self::Error(_) => "ErrorFrame",
            Self::UserStartedSpeaking(_) => "UserStartedSpeakingFrame",
            Self::UserStoppedSpeaking(_) => "UserStoppedSpeakingFrame",
            Self::InputAudioRaw(_) => "InputAudioRawFrame",
            Self::Metrics(_) => "MetricsFrame",
            Self::FunctionCallsStarted(_) => "FunctionCallsStartedFrame",
            Self::Text(_) => "TextFrame",
            Self::Transcription(_) => "TranscriptionFrame",
            Self::InterimTranscription(_) => "InterimTranscriptionFrame",
            Self::TTSAudioRaw(_) => "TTSAudioRawFrame",
            Self::FunctionCallResult(_) => "FunctionCallResultFrame",
            Self::LLMRun(_) => "LLMRunFrame",
            Self::End(_) => "EndFrame",
            Self::LLMResponseStart(_) => "LLMResponseStartFrame",
            Self::LLMResponseEnd(_) => "LLMResponseEndFrame",
            Self::TTSStarted(_) => "TTSStartedFrame",
            Self::TTSStopped(_) => "TTSStoppedFrame",
        }
    }

    /// Returns the frame kind (System, Data, or Control).
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Start(_)
            | Self::Cancel(_)
            | Self::Error(_)
            | Self::UserStartedSpeaking(_)
            | Self::UserStoppedSpeaking(_)
            | Self::InputAudioRaw(_)
            | Self::Metrics(_)
            | Self::FunctionCallsStarted(_) => FrameKind::System,

            Self::Text(_)
            | Self::Transcription(_)
            | Self::InterimTranscription(_)
            | Self::TTSAudioRaw(_)
            | Self::FunctionCallResult(_)
            | Self::LLMRun(_) => FrameKind::Data,

            Self::End(_)
            | Self::LLMResponseStart(_)
            | Self::LLMResponseEnd(_)
            | Self::TTSStarted(_)
            | Self::TTSStopped(_) => FrameKind::Control,
        }
    }

    pub fn is_system_frame(&self) -> bool {
        self.kind() == FrameKind::System
    }

    pub fn is_data_frame(&self) -> bool {
        self.kind() == FrameKind::Data
    }

    pub fn is_control_frame(&self) -> bool {
        self.kind() == FrameKind::Control
    }
}

impl fmt::Display for FrameEnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(t) => write!(f, "TextFrame#{}({:?})", t.fields.id, t.text),
            Self::Transcription(t) => {
                write!(f, "TranscriptionFrame#{}({:?})", t.fields.id, t.text)
            }
            Self::InterimTranscription(t) => {
                write!(f, "InterimTranscriptionFrame#{}({:?})", t.fields.id, t.text)
            }
            Self::Error(e) => {
                write!(f, "ErrorFrame#{}(fatal={}, {})", e.fields.id, e.fatal, e.error)
            }
            Self::InputAudioRaw(a) => write!(
                f,
                "InputAudioRawFrame#{}({} bytes @ {} Hz)",
                a.fields.id,
                a.audio.audio.len(),
                a.audio.sample_rate
            ),
            Self::TTSAudioRaw(a) => write!(
                f,
                "TTSAudioRawFrame#{}({} bytes @ {} Hz)",
                a.fields.id,
                a.audio.audio.len(),
                a.audio.sample_rate
            ),
            Self::FunctionCallsStarted(c) => write!(
                f,
                "FunctionCallsStartedFrame#{}({} calls)",
                c.fields.id,
                c.function_calls.len()
            ),
            other => write!(f, "{}#{}", other.name(), other.id()),
        }
    }
}

macro_rules! impl_from_frame {
    ($variant:ident, $frame_type:ident) => {
        impl From<$frame_type> for FrameEnum {
            fn from(f: $frame_type) -> Self {
                Self::$variant(f)
            }
        }
    };
}

impl_from_frame!(Start, StartFrame);
impl_from_frame!(Cancel, CancelFrame);
impl_from_frame!(Error, ErrorFrame);
impl_from_frame!(UserStartedSpeaking, UserStartedSpeakingFrame);
impl_from_frame!(UserStoppedSpeaking, UserStoppedSpeakingFrame);
impl_from_frame!(InputAudioRaw, InputAudioRawFrame);
impl_from_frame!(Metrics, MetricsFrame);
impl_from_frame!(FunctionCallsStarted, FunctionCallsStartedFrame);
impl_from_frame!(Text, TextFrame);
impl_from_frame!(Transcription, TranscriptionFrame);
impl_from_frame!(InterimTranscription, InterimTranscriptionFrame);
impl_from_frame!(TTSAudioRaw, TTSAudioRawFrame);
impl_from_frame!(FunctionCallResult, FunctionCallResultFrame);
impl_from_frame!(LLMRun, LLMRunFrame);
impl_from_frame!(End, EndFrame);
impl_from_frame!(LLMResponseStart, LLMResponseStartFrame);
impl_from_frame!(LLMResponseEnd, LLMResponseEndFrame);
impl_from_frame!(TTSStarted, TTSStartedFrame);
impl_from_frame!(TTSStopped, TTSStoppedFrame);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
