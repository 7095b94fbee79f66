// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Voicewire - a real-time conversational voice agent.
//!
//! Audio from a session peer flows through a frame pipeline: voice activity
//! detection, Deepgram speech-to-text, an OpenAI chat completion (with
//! function tools), sentence assembly, and ElevenLabs speech synthesis back
//! out to the peer. Turns are strictly serial; one utterance is fully
//! answered before the next is considered.

pub mod agent;
pub mod audio;
pub mod config;
pub mod error;
pub mod frames;
pub mod metrics;
pub mod pipeline;
pub mod prelude;
pub mod processors;
pub mod serializers;
pub mod services;
pub mod tools;
pub mod transport;
pub mod utils;
