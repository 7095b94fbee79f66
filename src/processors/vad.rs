// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Voice activity detection processor.
//!
//! Watches the inbound audio stream and emits `UserStartedSpeakingFrame` /
//! `UserStoppedSpeakingFrame` on confirmed transitions. Audio frames are
//! always forwarded; the STT service downstream consumes the same stream.

use async_trait::async_trait;

#[cfg(feature = "silero-vad")]
use crate::audio::silero::{SileroVad, SILERO_CHUNK_SAMPLES, SILERO_SAMPLE_RATE};
use crate::audio::vad::{VadEvent, VadStateMachine};
use crate::audio::VadParams;
use crate::frames::{FrameEnum, UserStartedSpeakingFrame, UserStoppedSpeakingFrame};
use crate::impl_processor_debug_display;
use crate::processors::processor::{Processor, ProcessorContext};
use crate::processors::FrameDirection;
use crate::utils::obj_id;

/// Energy-based VAD processor, optionally scored by the Silero model.
pub struct VadProcessor {
    name: String,
    id: u64,
    machine: VadStateMachine,
    #[cfg(feature = "silero-vad")]
    silero: Option<SileroVad>,
    #[cfg(feature = "silero-vad")]
    sample_buffer: Vec<f32>,
}

impl_processor_debug_display!(VadProcessor);

impl VadProcessor {
    pub fn new(params: VadParams) -> Self {
        Self {
            name: "vad".to_string(),
            id: obj_id(),
            machine: VadStateMachine::new(params),
            #[cfg(feature = "silero-vad")]
            silero: None,
            #[cfg(feature = "silero-vad")]
            sample_buffer: Vec::new(),
        }
    }

    /// Score speech with the Silero model instead of RMS energy. Requires
    /// 16 kHz mono input.
    #[cfg(feature = "silero-vad")]
    pub fn with_silero(params: VadParams, silero: SileroVad) -> Self {
        let mut processor = Self::new(params);
        processor.silero = Some(silero);
        processor
    }

    fn feed(&mut self, audio: &[u8]) -> Vec<VadEvent> {
        #[cfg(feature = "silero-vad")]
        if let Some(silero) = &mut self.silero {
            let mut events = Vec::new();
            self.sample_buffer.extend(
                audio
                    .chunks_exact(2)
                    .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0),
            );
            let mut offset = 0;
            while self.sample_buffer.len() - offset >= SILERO_CHUNK_SAMPLES {
                let chunk = &self.sample_buffer[offset..offset + SILERO_CHUNK_SAMPLES];
                offset += SILERO_CHUNK_SAMPLES;
                match silero.process(chunk) {
                    Ok(confidence) => {
                        let event = self.machine.feed_confidence(confidence as f64);
                        if event != VadEvent::None {
                            events.push(event);
                        }
                    }
                    Err(e) => tracing::warn!("silero inference failed: {e}"),
                }
            }
            self.sample_buffer.drain(..offset);
            return events;
        }

        match self.machine.feed_audio(audio) {
            VadEvent::None => Vec::new(),
            event => vec![event],
        }
    }

    fn reset(&mut self) {
        self.machine.reset();
        #[cfg(feature = "silero-vad")]
        {
            if let Some(silero) = &mut self.silero {
                silero.reset();
            }
            self.sample_buffer.clear();
        }
    }
}

impl Default for VadProcessor {
    fn default() -> Self {
        Self::new(VadParams::default())
    }
}

#[async_trait]
impl Processor for VadProcessor {
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
            FrameEnum::Start(ref start) => {
                self.machine.set_sample_rate(start.audio_in_sample_rate);
                #[cfg(feature = "silero-vad")]
                if self.silero.is_some() && start.audio_in_sample_rate != SILERO_SAMPLE_RATE {
                    tracing::warn!(
                        sample_rate = start.audio_in_sample_rate,
                        "silero model expects 16 kHz input"
                    );
                }
                ctx.send(frame, direction);
            }
            FrameEnum::InputAudioRaw(ref input) => {
                for event in self.feed(&input.audio.audio) {
                    match event {
                        VadEvent::SpeechStarted => {
                            tracing::debug!("speech started");
                            ctx.send_downstream(FrameEnum::UserStartedSpeaking(
                                UserStartedSpeakingFrame::new(),
                            ));
                        }
                        VadEvent::SpeechStopped => {
                            tracing::debug!("speech stopped");
                            ctx.send_downstream(FrameEnum::UserStoppedSpeaking(
                                UserStoppedSpeakingFrame::new(),
                            ));
                        }
                        VadEvent::None => {}
                    }
                }
                ctx.send(frame, direction);
            }
            FrameEnum::Cancel(_) | FrameEnum::End(_) => {
                self.reset();
                ctx.send(frame, direction);
            }
            other => ctx.send(other, direction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use crate::frames::{InputAudioRawFrame, StartFrame};

    fn test_ctx() -> (ProcessorContext, mpsc::UnboundedReceiver<FrameEnum>) {
        let (dtx, drx) = mpsc::unbounded_channel();
        let (utx, _urx) = mpsc::unbounded_channel();
        (ProcessorContext::for_test(dtx, utx), drx)
    }

    fn loud_audio(num_samples: usize) -> FrameEnum {
        let mut audio = Vec::with_capacity(num_samples * 2);
        for _ in 0..num_samples {
            audio.extend_from_slice(&(i16::MAX / 2).to_le_bytes());
        }
        FrameEnum::InputAudioRaw(InputAudioRawFrame::new(audio, 16000, 1))
    }

    fn silent_audio(num_samples: usize) -> FrameEnum {
        FrameEnum::InputAudioRaw(InputAudioRawFrame::new(vec![0u8; num_samples * 2], 16000, 1))
    }

    fn sensitive_vad() -> VadProcessor {
        VadProcessor::new(VadParams {
            confidence: 0.01,
            start_secs: 0.01,
            stop_secs: 0.01,
            min_volume: 0.01,
        })
    }

    #[tokio::test]
    async fn emits_speech_events_around_audio() {
        let mut vad = sensitive_vad();
        let (ctx, mut drx) = test_ctx();

        vad.process(
            FrameEnum::Start(StartFrame::default()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        assert!(matches!(drx.recv().await, Some(FrameEnum::Start(_))));

        // 200 ms of loud audio triggers a start event before the forwarded
        // audio frame.
        vad.process(loud_audio(3200), FrameDirection::Downstream, &ctx)
            .await;
        assert!(matches!(
            drx.recv().await,
            Some(FrameEnum::UserStartedSpeaking(_))
        ));
        assert!(matches!(drx.recv().await, Some(FrameEnum::InputAudioRaw(_))));

        vad.process(silent_audio(3200), FrameDirection::Downstream, &ctx)
            .await;
        assert!(matches!(
            drx.recv().await,
            Some(FrameEnum::UserStoppedSpeaking(_))
        ));
        assert!(matches!(drx.recv().await, Some(FrameEnum::InputAudioRaw(_))));
    }

    #[tokio::test]
    async fn default_params_detect_speech_level_audio() {
        let mut vad = VadProcessor::default();
        let (ctx, mut drx) = test_ctx();

        vad.process(
            FrameEnum::Start(StartFrame::default()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        drx.recv().await.unwrap();

        // Half a second at speech amplitude must fire a start event with the
        // stock thresholds.
        vad.process(loud_audio(8000), FrameDirection::Downstream, &ctx)
            .await;
        assert!(matches!(
            drx.recv().await,
            Some(FrameEnum::UserStartedSpeaking(_))
        ));
        assert!(matches!(drx.recv().await, Some(FrameEnum::InputAudioRaw(_))));
    }

    #[tokio::test]
    async fn silence_produces_no_events() {
        let mut vad = sensitive_vad();
        let (ctx, mut drx) = test_ctx();

        vad.process(
            FrameEnum::Start(StartFrame::default()),
            FrameDirection::Downstream,
            &ctx,
        )
        .await;
        drx.recv().await.unwrap();

        vad.process(silent_audio(3200), FrameDirection::Downstream, &ctx)
            .await;
        assert!(matches!(drx.recv().await, Some(FrameEnum::InputAudioRaw(_))));
        assert!(drx.try_recv().is_err());
    }

    #[tokio::test]
    async fn audio_before_start_is_forwarded_untouched() {
        let mut vad = sensitive_vad();
        let (ctx, mut drx) = test_ctx();

        // No StartFrame yet: machine uninitialized, audio still flows.
        vad.process(loud_audio(3200), FrameDirection::Downstream, &ctx)
            .await;
        assert!(matches!(drx.recv().await, Some(FrameEnum::InputAudioRaw(_))));
        assert!(drx.try_recv().is_err());
    }
}
