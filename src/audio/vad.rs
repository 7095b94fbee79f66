// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Voice activity detection state machine.
//!
//! Pure logic, no frame types. The machine moves through
//! `Quiet -> Starting -> Speaking -> Stopping -> Quiet` based on per-window
//! confidence, and reports completed transitions as [`VadEvent`]s. Confidence
//! comes either from RMS energy over 10 ms PCM windows ([`feed_audio`]) or
//! from an external scorer such as Silero ([`feed_confidence`]).
//!
//! [`feed_audio`]: VadStateMachine::feed_audio
//! [`feed_confidence`]: VadStateMachine::feed_confidence

use crate::audio::{calculate_rms, exp_smoothing, VadParams, VadState};

/// Smoothing factor for the volume envelope.
const VOLUME_SMOOTHING: f64 = 0.2;

/// Normalized RMS treated as fully-confident speech. Conversational speech
/// sits around 0.05-0.25 RMS, far below the `[0.0, 1.0]` probability range
/// the [`VadParams`] thresholds are calibrated for, so energy windows are
/// scored as `rms / SPEECH_RMS_REFERENCE` capped at `1.0`.
const SPEECH_RMS_REFERENCE: f64 = 0.1;

/// Completed state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    None,
    SpeechStarted,
    SpeechStopped,
}

/// Detects speech start and stop in a PCM16 audio stream.
pub struct VadStateMachine {
    params: VadParams,
    state: VadState,
    sample_rate: u32,
    num_channels: u32,
    /// Bytes per 10 ms analysis window.
    window_bytes: usize,
    /// Consecutive speech windows needed to confirm a start.
    start_windows: u32,
    /// Consecutive quiet windows needed to confirm a stop.
    stop_windows: u32,
    starting_count: u32,
    stopping_count: u32,
    buffer: Vec<u8>,
    smoothed_volume: f64,
    initialized: bool,
}

impl VadStateMachine {
    /// Create an uninitialized machine. Call
    /// [`set_sample_rate`](Self::set_sample_rate) before feeding audio.
    pub fn new(params: VadParams) -> Self {
        Self {
            params,
            state: VadState::Quiet,
            sample_rate: 0,
            num_channels: 1,
            window_bytes: 0,
            start_windows: 0,
            stop_windows: 0,
            starting_count: 0,
            stopping_count: 0,
            buffer: Vec::with_capacity(4096),
            smoothed_volume: 0.0,
            initialized: false,
        }
    }

    /// Initialize the analysis window and start/stop thresholds for a
    /// sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        // 10 ms windows.
        let window_samples = (sample_rate / 100).max(1);
        self.window_bytes = window_samples as usize * self.num_channels as usize * 2;
        let window_secs = window_samples as f64 / sample_rate as f64;
        self.start_windows = (self.params.start_secs / window_secs).round().max(1.0) as u32;
        self.stop_windows = (self.params.stop_secs / window_secs).round().max(1.0) as u32;
        self.initialized = true;
    }

    pub fn state(&self) -> VadState {
        self.state
    }

    pub fn params(&self) -> &VadParams {
        &self.params
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Return to `Quiet`, clearing counters and buffered audio.
    pub fn reset(&mut self) {
        self.state = VadState::Quiet;
        self.starting_count = 0;
        self.stopping_count = 0;
        self.buffer.clear();
        self.smoothed_volume = 0.0;
    }

    /// Feed PCM16 bytes. Complete 10 ms windows are scored by RMS energy,
    /// mapped onto the confidence scale, and checked against both the
    /// confidence and volume thresholds; a partial window stays buffered for
    /// the next call.
    pub fn feed_audio(&mut self, audio: &[u8]) -> VadEvent {
        if !self.initialized || self.window_bytes == 0 {
            return VadEvent::None;
        }

        self.buffer.extend_from_slice(audio);

        let mut event = VadEvent::None;
        while self.buffer.len() >= self.window_bytes {
            let window: Vec<u8> = self.buffer.drain(..self.window_bytes).collect();
            let confidence = (calculate_rms(&window) / SPEECH_RMS_REFERENCE).min(1.0);
            self.smoothed_volume =
                exp_smoothing(confidence, self.smoothed_volume, VOLUME_SMOOTHING);

            let speaking = confidence >= self.params.confidence
                && self.smoothed_volume >= self.params.min_volume;

            if let e @ (VadEvent::SpeechStarted | VadEvent::SpeechStopped) = self.step(speaking) {
                event = e;
            }
        }
        event
    }

    /// Feed a pre-computed confidence score in `[0.0, 1.0]`, one per
    /// analysis window. The volume floor is not applied; an external scorer
    /// already accounts for energy.
    pub fn feed_confidence(&mut self, confidence: f64) -> VadEvent {
        self.step(confidence >= self.params.confidence)
    }

    /// Advance one analysis window and report a completed transition.
    fn step(&mut self, speaking: bool) -> VadEvent {
        if speaking {
            match self.state {
                VadState::Quiet => {
                    self.state = VadState::Starting;
                    self.starting_count = 1;
                }
                VadState::Starting => self.starting_count += 1,
                VadState::Stopping => {
                    // Speech resumed before the stop threshold.
                    self.state = VadState::Speaking;
                    self.stopping_count = 0;
                }
                VadState::Speaking => {}
            }
        } else {
            match self.state {
                VadState::Starting => {
                    // False start.
                    self.state = VadState::Quiet;
                    self.starting_count = 0;
                }
                VadState::Speaking => {
                    self.state = VadState::Stopping;
                    self.stopping_count = 1;
                }
                VadState::Stopping => self.stopping_count += 1,
                VadState::Quiet => {}
            }
        }

        if self.state == VadState::Starting && self.starting_count >= self.start_windows {
            self.state = VadState::Speaking;
            self.starting_count = 0;
            return VadEvent::SpeechStarted;
        }
        if self.state == VadState::Stopping && self.stopping_count >= self.stop_windows {
            self.state = VadState::Quiet;
            self.stopping_count = 0;
            return VadEvent::SpeechStopped;
        }
        VadEvent::None
    }
}

impl std::fmt::Debug for VadStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VadStateMachine")
            .field("state", &self.state)
            .field("sample_rate", &self.sample_rate)
            .field("start_windows", &self.start_windows)
            .field("stop_windows", &self.stop_windows)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for &s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }

    fn sensitive_params() -> VadParams {
        VadParams {
            confidence: 0.01,
            start_secs: 0.01,
            stop_secs: 0.01,
            min_volume: 0.01,
        }
    }

    #[test]
    fn starts_quiet_and_uninitialized() {
        let sm = VadStateMachine::new(VadParams::default());
        assert_eq!(sm.state(), VadState::Quiet);
        assert!(!sm.is_initialized());
    }

    #[test]
    fn window_size_matches_sample_rate() {
        let mut sm = VadStateMachine::new(VadParams::default());
        sm.set_sample_rate(16000);
        assert!(sm.is_initialized());
        // 160 samples per 10 ms window, mono PCM16.
        assert_eq!(sm.window_bytes, 320);
        assert!(sm.start_windows > 0);
        assert!(sm.stop_windows > 0);
    }

    #[test]
    fn silence_stays_quiet() {
        let mut sm = VadStateMachine::new(VadParams::default());
        sm.set_sample_rate(16000);
        let event = sm.feed_audio(&pcm(&vec![0i16; 3200]));
        assert_eq!(event, VadEvent::None);
        assert_eq!(sm.state(), VadState::Quiet);
    }

    /// 200 Hz square wave at half scale, mono 16 kHz. Each 10 ms window has
    /// an RMS of 0.5, comfortably in speech territory.
    fn square_wave(amplitude: i16, num_samples: usize) -> Vec<u8> {
        let half_period = 16000 / 200 / 2;
        let samples: Vec<i16> = (0..num_samples)
            .map(|i| {
                if (i / half_period) % 2 == 0 {
                    amplitude
                } else {
                    -amplitude
                }
            })
            .collect();
        pcm(&samples)
    }

    #[test]
    fn default_params_detect_speech_level_audio() {
        let mut sm = VadStateMachine::new(VadParams::default());
        sm.set_sample_rate(16000);
        // Half a second of voiced-level signal.
        let event = sm.feed_audio(&square_wave(i16::MAX / 2, 8000));
        assert_eq!(event, VadEvent::SpeechStarted);
        assert_eq!(sm.state(), VadState::Speaking);
    }

    #[test]
    fn default_params_hold_quiet_through_low_level_noise() {
        let mut sm = VadStateMachine::new(VadParams::default());
        sm.set_sample_rate(16000);
        // Room-noise amplitude, roughly 0.01 RMS.
        let event = sm.feed_audio(&square_wave(300, 8000));
        assert_eq!(event, VadEvent::None);
        assert_eq!(sm.state(), VadState::Quiet);
    }

    #[test]
    fn sustained_loud_audio_starts_speech() {
        let mut sm = VadStateMachine::new(sensitive_params());
        sm.set_sample_rate(16000);
        let event = sm.feed_audio(&pcm(&vec![i16::MAX / 2; 3200]));
        assert_eq!(event, VadEvent::SpeechStarted);
        assert_eq!(sm.state(), VadState::Speaking);
    }

    #[test]
    fn silence_after_speech_stops() {
        let mut sm = VadStateMachine::new(sensitive_params());
        sm.set_sample_rate(16000);
        assert_eq!(
            sm.feed_audio(&pcm(&vec![i16::MAX / 2; 3200])),
            VadEvent::SpeechStarted
        );
        assert_eq!(sm.feed_audio(&pcm(&vec![0i16; 3200])), VadEvent::SpeechStopped);
        assert_eq!(sm.state(), VadState::Quiet);
    }

    #[test]
    fn partial_window_is_buffered() {
        let mut sm = VadStateMachine::new(sensitive_params());
        sm.set_sample_rate(16000);
        // 100 samples = less than one 160-sample window.
        assert_eq!(sm.feed_audio(&pcm(&vec![i16::MAX / 2; 100])), VadEvent::None);
        assert_eq!(sm.buffer.len(), 200);
    }

    #[test]
    fn confidence_path_ignores_volume_floor() {
        let mut sm = VadStateMachine::new(VadParams {
            confidence: 0.5,
            start_secs: 0.02,
            stop_secs: 0.02,
            min_volume: 0.99,
        });
        sm.set_sample_rate(16000);

        let mut started = false;
        for _ in 0..10 {
            if sm.feed_confidence(0.9) == VadEvent::SpeechStarted {
                started = true;
                break;
            }
        }
        assert!(started);
        assert_eq!(sm.state(), VadState::Speaking);
    }

    #[test]
    fn low_confidence_stays_quiet() {
        let mut sm = VadStateMachine::new(VadParams::default());
        sm.set_sample_rate(16000);
        for _ in 0..50 {
            assert_eq!(sm.feed_confidence(0.1), VadEvent::None);
        }
        assert_eq!(sm.state(), VadState::Quiet);
    }

    #[test]
    fn false_start_returns_to_quiet() {
        let mut sm = VadStateMachine::new(VadParams {
            confidence: 0.5,
            start_secs: 0.1,
            stop_secs: 0.1,
            min_volume: 0.1,
        });
        sm.set_sample_rate(16000);
        // One speech window then quiet: never reaches Speaking.
        assert_eq!(sm.feed_confidence(0.9), VadEvent::None);
        assert_eq!(sm.state(), VadState::Starting);
        assert_eq!(sm.feed_confidence(0.1), VadEvent::None);
        assert_eq!(sm.state(), VadState::Quiet);
    }

    #[test]
    fn reset_clears_state() {
        let mut sm = VadStateMachine::new(sensitive_params());
        sm.set_sample_rate(16000);
        sm.feed_audio(&pcm(&vec![i16::MAX / 2; 3200]));
        assert_eq!(sm.state(), VadState::Speaking);
        sm.reset();
        assert_eq!(sm.state(), VadState::Quiet);
        assert!(sm.buffer.is_empty());
    }
}
