// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Audio analysis: voice activity detection and model management.

pub mod models;
#[cfg(feature = "silero-vad")]
pub mod silero;
pub mod vad;

use serde::{Deserialize, Serialize};

/// States of the voice activity detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    Quiet,
    Starting,
    Speaking,
    Stopping,
}

/// Tuning parameters for voice activity detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadParams {
    /// Per-window confidence threshold in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Seconds of sustained speech before `SpeechStarted` fires.
    pub start_secs: f64,
    /// Seconds of sustained quiet before `SpeechStopped` fires.
    pub stop_secs: f64,
    /// Smoothed volume floor, applied only to energy-based detection.
    pub min_volume: f64,
}

impl Default for VadParams {
    fn default() -> Self {
        Self {
            confidence: 0.7,
            start_secs: 0.2,
            stop_secs: 0.8,
            min_volume: 0.6,
        }
    }
}

/// RMS energy of PCM16 little-endian audio, normalized to `[0.0, 1.0]`.
pub fn calculate_rms(audio: &[u8]) -> f64 {
    let num_samples = audio.len() / 2;
    if num_samples == 0 {
        return 0.0;
    }

    let mut sum_squares = 0.0f64;
    for chunk in audio.chunks_exact(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]) as f64;
        sum_squares += sample * sample;
    }

    let rms = (sum_squares / num_samples as f64).sqrt();
    (rms / i16::MAX as f64).clamp(0.0, 1.0)
}

/// Single-pole exponential smoothing.
pub fn exp_smoothing(value: f64, prev_value: f64, factor: f64) -> f64 {
    prev_value + factor * (value - prev_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_silence_is_zero() {
        let silence = vec![0u8; 640];
        assert_eq!(calculate_rms(&silence), 0.0);
    }

    #[test]
    fn rms_of_full_scale_is_near_one() {
        let mut audio = Vec::new();
        for _ in 0..320 {
            audio.extend_from_slice(&i16::MAX.to_le_bytes());
        }
        assert!(calculate_rms(&audio) > 0.99);
    }

    #[test]
    fn rms_of_empty_slice_is_zero() {
        assert_eq!(calculate_rms(&[]), 0.0);
    }

    #[test]
    fn smoothing_converges_toward_value() {
        let mut v = 0.0;
        for _ in 0..50 {
            v = exp_smoothing(1.0, v, 0.2);
        }
        assert!(v > 0.99);
    }
}
