// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Sentence aggregation for TTS input.
//!
//! LLM tokens arrive a few characters at a time. Feeding each token to the
//! TTS service separately produces choppy audio, so this processor buffers
//! `TextFrame`s until a sentence boundary and emits one frame per sentence.

use async_trait::async_trait;

use crate::frames::{FrameEnum, TextFrame};
use crate::impl_processor_debug_display;
use crate::processors::processor::{Processor, ProcessorContext};
use crate::processors::FrameDirection;
use crate::utils::obj_id;

const SENTENCE_ENDINGS: [char; 4] = ['.', '!', '?', '\n'];

fn is_sentence_end(text: &str) -> bool {
    if text.ends_with('\n') {
        return true;
    }
    match text.trim_end().chars().last() {
        Some(c) => SENTENCE_ENDINGS.contains(&c),
        None => false,
    }
}

/// Buffers streamed text and emits complete sentences.
pub struct SentenceAggregator {
    name: String,
    id: u64,
    aggregation: String,
}

impl_processor_debug_display!(SentenceAggregator);

impl SentenceAggregator {
    pub fn new() -> Self {
        Self {
            name: "sentence_aggregator".to_string(),
            id: obj_id(),
            aggregation: String::new(),
        }
    }

    fn flush(&mut self, ctx: &ProcessorContext) {
        if self.aggregation.trim().is_empty() {
            self.aggregation.clear();
            return;
        }
        let sentence = std::mem::take(&mut self.aggregation);
        ctx.send_downstream(FrameEnum::Text(TextFrame::new(sentence.trim())));
    }
}

impl Default for SentenceAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for SentenceAggregator {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> u64 {
        self.id
    }

    async fn process(
        &mut self,
        frame: FrameEnum,
        direction: FrameDirection,
        ctx: &ProcessorContext,
    ) {
        match frame {
            FrameEnum::Text(ref t) => {
                self.aggregation.push_str(&t.text);
                if is_sentence_end(&self.aggregation) {
                    self.flush(ctx);
                }
                // The token frame itself is consumed; only whole sentences
                // move downstream.
            }
            FrameEnum::LLMResponseEnd(_) => {
                self.flush(ctx);
                ctx.send(frame, direction);
            }
            FrameEnum::InterimTranscription(_) => {}
            other => ctx.send(other, direction),
        }
    }
}
