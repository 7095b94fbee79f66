// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! AI service integrations (STT, LLM, TTS).

pub mod deepgram;
pub mod elevenlabs;
pub mod openai;

use async_trait::async_trait;

use crate::processors::processor::Processor;

/// Base trait for processors backed by an external AI vendor.
#[async_trait]
pub trait AIService: Processor {
    /// Model identifier used by this service, if any.
    fn model(&self) -> Option<&str> {
        None
    }

    /// Stop the service gracefully.
    async fn stop(&mut self) {}

    /// Cancel the service immediately.
    async fn cancel(&mut self) {}
}
