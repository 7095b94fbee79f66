// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Common re-exports for building and running an agent.
//!
//! ```
//! use voicewire::prelude::*;
//! ```

pub use std::sync::Arc;

pub use crate::agent::{Agent, AgentSession};
pub use crate::audio::{VadParams, VadState};
pub use crate::config::AgentConfig;
pub use crate::error::AgentError;
pub use crate::frames::{
    AudioRawData, CancelFrame, EndFrame, ErrorFrame, FrameEnum, FrameKind, InputAudioRawFrame,
    InterimTranscriptionFrame, LLMResponseEndFrame, LLMResponseStartFrame, LLMRunFrame,
    MetricsFrame, StartFrame, TTSAudioRawFrame, TTSStartedFrame, TTSStoppedFrame, TextFrame,
    TranscriptionFrame, UserStartedSpeakingFrame, UserStoppedSpeakingFrame,
};
pub use crate::metrics::{MetricsData, UsageCollector, UsageSummary};
pub use crate::pipeline::ChannelPipeline;
pub use crate::processors::aggregators::context::{ChatContext, SharedChatContext};
pub use crate::processors::aggregators::sentence::SentenceAggregator;
pub use crate::processors::aggregators::turn::{AssistantContextAggregator, UserContextAggregator};
pub use crate::processors::vad::VadProcessor;
pub use crate::processors::{FrameDirection, Processor, ProcessorContext, ProcessorWeight};
pub use crate::serializers::{FrameSerializer, SerializedFrame};
pub use crate::services::deepgram::DeepgramSttService;
pub use crate::services::elevenlabs::ElevenLabsTtsService;
pub use crate::services::openai::OpenAiLlmService;
pub use crate::services::AIService;
pub use crate::tools::{FunctionTool, LookupWeather, ToolExecutor, ToolRegistry};
pub use crate::transport::{BridgeServer, PeerHandler, RoomSession};
