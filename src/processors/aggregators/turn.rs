// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Turn assembly aggregators.
//!
//! [`UserContextAggregator`] sits after the STT service. It collects final
//! transcription text for the current utterance and, once the user has
//! stopped speaking and the transcript is complete, writes the user message
//! into the shared [`ChatContext`](super::ChatContext) and emits an
//! `LLMRunFrame` to trigger inference. Because the trigger is only emitted
//! after the final transcript is consumed, no reply can be produced from a
//! partial utterance.
//!
//! [`AssistantContextAggregator`] sits at the end of the pipeline. It
//! accumulates the streamed reply text between `LLMResponseStart` and
//! `LLMResponseEnd` and records the assistant message in the same context.

use async_trait::async_trait;

use crate::frames::{FrameEnum, LLMRunFrame};
use crate::impl_processor_debug_display;
use crate::processors::processor::{Processor, ProcessorContext};
use crate::processors::FrameDirection;
use crate::utils::obj_id;

use super::context::SharedChatContext;

// ---------------------------------------------------------------------------
// UserContextAggregator
// ---------------------------------------------------------------------------

/// Collects user transcription text and triggers an LLM run per utterance.
///
/// Final transcripts can arrive after the speech-stop event (the STT service
/// finalizes asynchronously), so the trigger fires on whichever comes second:
/// `UserStoppedSpeaking` with buffered text, or the first final transcript
/// after the stop event.
pub struct UserContextAggregator {
    name: String,
    id: u64,
    context: SharedChatContext,
    /// Transcript text for the utterance in progress.
    aggregation: String,
    user_speaking: bool,
}

impl_processor_debug_display!(UserContextAggregator);

impl UserContextAggregator {
    pub fn new(context: SharedChatContext) -> Self {
        Self {
            name: "user_context_aggregator".to_string(),
            id: obj_id(),
            context,
            aggregation: String::new(),
            user_speaking: false,
        }
    }

    pub fn context(&self) -> &SharedChatContext {
        &self.context
    }

    #[cfg(test)]
    pub(crate) fn aggregation(&self) -> &str {
        &self.aggregation
    }

    fn append_transcript(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.aggregation.is_empty() {
            self.aggregation.push(' ');
        }
        self.aggregation.push_str(text);
    }

    /// Write the aggregated user message into the shared context and emit
    /// the inference trigger.
    async fn flush(&mut self, ctx: &ProcessorContext) {
        if self.aggregation.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.aggregation);
        tracing::debug!(utterance = %text, "user turn complete");
        {
            let mut chat = self.context.lock().await;
            chat.add_user_message(&text);
        }
        ctx.send_downstream(FrameEnum::LLMRun(LLMRunFrame::new()));
    }
}

#[async_trait]
impl Processor for UserContextAggregator {
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
            FrameEnum::UserStartedSpeaking(_) => {
                self.user_speaking = true;
                ctx.send(frame, direction);
            }
            FrameEnum::UserStoppedSpeaking(_) => {
                self.user_speaking = false;
                self.flush(ctx).await;
                ctx.send(frame, direction);
            }
            FrameEnum::Transcription(ref t) => {
                self.append_transcript(&t.text);
                // Transcripts that finalize after the stop event complete
                // the turn on arrival.
                if !self.user_speaking {
                    self.flush(ctx).await;
                }
                // Transcription frames are consumed here.
            }
            FrameEnum::InterimTranscription(_) => {
                // Partial transcripts never reach the context.
            }
            other => ctx.send(other, direction),
        }
    }
}

// ---------------------------------------------------------------------------
// AssistantContextAggregator
// ---------------------------------------------------------------------------

/// Accumulates the streamed reply and records it as an assistant message.
pub struct AssistantContextAggregator {
    name: String,
    id: u64,
    context: SharedChatContext,
    aggregation: String,
    in_response: bool,
}

impl_processor_debug_display!(AssistantContextAggregator);

impl AssistantContextAggregator {
    pub fn new(context: SharedChatContext) -> Self {
        Self {
            name: "assistant_context_aggregator".to_string(),
            id: obj_id(),
            context,
            aggregation: String::new(),
            in_response: false,
        }
    }

    pub fn context(&self) -> &SharedChatContext {
        &self.context
    }

    async fn record_reply(&mut self) {
        let text = std::mem::take(&mut self.aggregation);
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let mut chat = self.context.lock().await;
        chat.add_assistant_message(text);
        tracing::debug!(chars = text.len(), "assistant reply recorded");
    }
}

#[async_trait]
impl Processor for AssistantContextAggregator {
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
            FrameEnum::LLMResponseStart(_) => {
                self.in_response = true;
                ctx.send(frame, direction);
            }
            FrameEnum::LLMResponseEnd(_) => {
                self.in_response = false;
                self.record_reply().await;
                ctx.send(frame, direction);
            }
            FrameEnum::Text(ref t) => {
                if self.in_response {
                    self.aggregation.push_str(&t.text);
                }
                ctx.send(frame, direction);
            }
            other => ctx.send(other, direction),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use crate::frames::{
        LLMResponseEndFrame, LLMResponseStartFrame, TextFrame, TranscriptionFrame,
        UserStartedSpeakingFrame, UserStoppedSpeakingFrame,
    };
    use crate::processors::aggregators::ChatContext;

    fn test_ctx() -> (
        ProcessorContext,
        mpsc::UnboundedReceiver<FrameEnum>,
        mpsc::UnboundedReceiver<FrameEnum>,
    ) {
        let (dtx, drx) = mpsc::unbounded_channel();
        let (utx, urx) = mpsc::unbounded_channel();
        (ProcessorContext::for_test(dtx, utx), drx, urx)
    }

    fn transcription(text: &str) -> FrameEnum {
        FrameEnum::Transcription(TranscriptionFrame::new(
            text.to_string(),
            "user".to_string(),
            "0.000Z".to_string(),
        ))
    }

    #[tokio::test]
    async fn user_turn_flushes_on_stop() {
        let context = ChatContext::new().shared();
        let mut agg = UserContextAggregator::new(context.clone());
        let (ctx, mut drx, _urx) = test_ctx();

        agg.process(
            FrameEnum::UserStartedSpeaking(UserStartedSpeakingFrame::new()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        drx.recv().await.expect("start forwarded");

        agg.process(transcription("What's the"), FrameDirection::Downstream, &ctx)
            .await;
        agg.process(transcription("weather?"), FrameDirection::Downstream, &ctx)
            .await;
        assert_eq!(agg.aggregation(), "What's the weather?");

        agg.process(
            FrameEnum::UserStoppedSpeaking(UserStoppedSpeakingFrame::new()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;

        // Trigger first, then the forwarded stop event.
        assert!(matches!(drx.recv().await, Some(FrameEnum::LLMRun(_))));
        assert!(matches!(
            drx.recv().await,
            Some(FrameEnum::UserStoppedSpeaking(_))
        ));

        let chat = context.lock().await;
        assert_eq!(chat.message_count(), 1);
        assert_eq!(chat.messages()[0]["role"], "user");
        assert_eq!(chat.messages()[0]["content"], "What's the weather?");
    }

    #[tokio::test]
    async fn late_final_transcript_completes_turn() {
        let context = ChatContext::new().shared();
        let mut agg = UserContextAggregator::new(context.clone());
        let (ctx, mut drx, _urx) = test_ctx();

        agg.process(
            FrameEnum::UserStartedSpeaking(UserStartedSpeakingFrame::new()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        // Stop arrives before the STT service finalizes.
        agg.process(
            FrameEnum::UserStoppedSpeaking(UserStoppedSpeakingFrame::new()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        drx.recv().await.expect("start forwarded");
        assert!(matches!(
            drx.recv().await,
            Some(FrameEnum::UserStoppedSpeaking(_))
        ));

        // No trigger yet: nothing was transcribed.
        assert!(drx.try_recv().is_err());

        agg.process(transcription("Hello there."), FrameDirection::Downstream, &ctx)
            .await;
        assert!(matches!(drx.recv().await, Some(FrameEnum::LLMRun(_))));

        let chat = context.lock().await;
        assert_eq!(chat.messages()[0]["content"], "Hello there.");
    }

    #[tokio::test]
    async fn interim_transcripts_are_dropped() {
        let context = ChatContext::new().shared();
        let mut agg = UserContextAggregator::new(context.clone());
        let (ctx, mut drx, _urx) = test_ctx();

        agg.process(
            FrameEnum::InterimTranscription(crate::frames::InterimTranscriptionFrame::new(
                "partial".into(),
                "user".into(),
                "0.000Z".into(),
            )),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;

        assert!(drx.try_recv().is_err());
        assert_eq!(agg.aggregation(), "");
    }

    #[tokio::test]
    async fn empty_utterance_produces_no_trigger() {
        let context = ChatContext::new().shared();
        let mut agg = UserContextAggregator::new(context.clone());
        let (ctx, mut drx, _urx) = test_ctx();

        agg.process(
            FrameEnum::UserStoppedSpeaking(UserStoppedSpeakingFrame::new()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;

        assert!(matches!(
            drx.recv().await,
            Some(FrameEnum::UserStoppedSpeaking(_))
        ));
        assert!(drx.try_recv().is_err());
        assert_eq!(context.lock().await.message_count(), 0);
    }

    #[tokio::test]
    async fn assistant_reply_recorded_on_response_end() {
        let context = ChatContext::new().shared();
        let mut agg = AssistantContextAggregator::new(context.clone());
        let (ctx, mut drx, _urx) = test_ctx();

        agg.process(
            FrameEnum::LLMResponseStart(LLMResponseStartFrame::new()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        agg.process(
            FrameEnum::Text(TextFrame::new("It is ")),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        agg.process(
            FrameEnum::Text(TextFrame::new("sunny today.")),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        agg.process(
            FrameEnum::LLMResponseEnd(LLMResponseEndFrame::new()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;

        let chat = context.lock().await;
        assert_eq!(chat.message_count(), 1);
        assert_eq!(chat.messages()[0]["role"], "assistant");
        assert_eq!(chat.messages()[0]["content"], "It is sunny today.");

        // All four frames forwarded.
        for _ in 0..4 {
            drx.recv().await.expect("forwarded");
        }
    }

    #[tokio::test]
    async fn text_outside_response_not_recorded() {
        let context = ChatContext::new().shared();
        let mut agg = AssistantContextAggregator::new(context.clone());
        let (ctx, _drx, _urx) = test_ctx();

        agg.process(
            FrameEnum::Text(TextFrame::new("stray")),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        assert_eq!(context.lock().await.message_count(), 0);
    }
}
