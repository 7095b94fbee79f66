// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Silero VAD v5 neural speech scoring.
//!
//! Wraps the Silero ONNX model for per-chunk speech probability. Input is
//! 512 f32 samples at 16 kHz; output is a probability in `[0.0, 1.0]`.

use ndarray::{Array1, Array2, Array3, Ix3};
use ort::session::Session;
use ort::value::Tensor;

use crate::audio::models::ModelManager;

/// Samples per inference call (32 ms at 16 kHz).
pub const SILERO_CHUNK_SAMPLES: usize = 512;

/// Context samples carried over from the previous chunk.
const CONTEXT_SAMPLES: usize = 64;

const INPUT_SIZE: usize = SILERO_CHUNK_SAMPLES + CONTEXT_SAMPLES;

/// LSTM hidden state size.
const STATE_SIZE: usize = 128;

/// The only sample rate the model accepts.
pub const SILERO_SAMPLE_RATE: u32 = 16000;

#[derive(Debug, thiserror::Error)]
pub enum SileroError {
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("model loading error: {0}")]
    Model(#[from] crate::audio::models::ModelError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Stateful Silero VAD scorer.
///
/// Carries the LSTM hidden state and a 64-sample context window between
/// calls, so chunks from one stream must be scored in order.
pub struct SileroVad {
    session: Session,
    /// LSTM state, shape `[2, 1, 128]`.
    state: Array3<f32>,
    context: Vec<f32>,
    sample_rate: i64,
}

impl SileroVad {
    /// Create a scorer, downloading the model into the cache if needed.
    pub async fn new() -> Result<Self, SileroError> {
        let model_path = ModelManager::get_silero_vad().await?;
        Self::from_path(&model_path)
    }

    /// Create a scorer from a local ONNX model file.
    pub fn from_path(model_path: &std::path::Path) -> Result<Self, SileroError> {
        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        Ok(Self {
            session,
            state: Array3::<f32>::zeros((2, 1, STATE_SIZE)),
            context: vec![0.0f32; CONTEXT_SAMPLES],
            sample_rate: SILERO_SAMPLE_RATE as i64,
        })
    }

    /// Clear the LSTM state and context window. Call between streams.
    pub fn reset(&mut self) {
        self.state = Array3::<f32>::zeros((2, 1, STATE_SIZE));
        self.context = vec![0.0f32; CONTEXT_SAMPLES];
    }

    /// Score one chunk of exactly [`SILERO_CHUNK_SAMPLES`] samples,
    /// normalized to `[-1.0, 1.0]`. Returns the speech probability.
    pub fn process(&mut self, audio_chunk: &[f32]) -> Result<f32, SileroError> {
        if audio_chunk.len() != SILERO_CHUNK_SAMPLES {
            return Err(SileroError::InvalidInput(format!(
                "expected {} samples, got {}",
                SILERO_CHUNK_SAMPLES,
                audio_chunk.len()
            )));
        }

        let mut input = Vec::with_capacity(INPUT_SIZE);
        input.extend_from_slice(&self.context);
        input.extend_from_slice(audio_chunk);

        self.context
            .copy_from_slice(&audio_chunk[SILERO_CHUNK_SAMPLES - CONTEXT_SAMPLES..]);

        let input_tensor = Array2::from_shape_vec((1, INPUT_SIZE), input)
            .map_err(|e| SileroError::InvalidInput(e.to_string()))?;
        let input_value = Tensor::from_array(input_tensor)?;
        let state_value = Tensor::from_array(self.state.clone())?;
        let sr_value = Tensor::from_array(Array1::from_vec(vec![self.sample_rate]))?;

        let outputs = self.session.run(ort::inputs![
            "input" => input_value,
            "state" => state_value,
            "sr" => sr_value,
        ])?;

        let output_array = outputs["output"].try_extract_array::<f32>()?;
        let probability = output_array.iter().next().copied().unwrap_or(0.0);

        let new_state = outputs["stateN"].try_extract_array::<f32>()?;
        self.state = new_state
            .to_owned()
            .into_dimensionality::<Ix3>()
            .map_err(|e| SileroError::InvalidInput(format!("state shape error: {e}")))?;

        Ok(probability)
    }
}
