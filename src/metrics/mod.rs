// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Metrics payloads and session usage accounting.
//!
//! Services attach [`MetricsData`] payloads to `MetricsFrame`s as they work:
//! time-to-first-byte, token usage, synthesized character counts. The
//! [`UsageCollector`] folds those payloads into a per-session summary that is
//! logged when the session shuts down.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Token usage statistics for a single LLM inference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LLMTokenUsage {
    /// Tokens in the input prompt.
    pub prompt_tokens: u64,
    /// Tokens in the generated completion.
    pub completion_tokens: u64,
    /// Total tokens used (prompt + completion).
    pub total_tokens: u64,
}

/// A single metrics payload emitted by a pipeline processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum MetricsData {
    /// Time To First Byte in seconds: latency until the first response byte
    /// arrives from a remote service.
    Ttfb {
        processor: String,
        model: Option<String>,
        value: f64,
    },
    /// Wall-clock processing time in seconds for a pipeline stage.
    Processing {
        processor: String,
        model: Option<String>,
        value: f64,
    },
    /// LLM token usage for one inference.
    LlmUsage {
        processor: String,
        model: Option<String>,
        value: LLMTokenUsage,
    },
    /// Characters sent to TTS synthesis.
    TtsUsage {
        processor: String,
        model: Option<String>,
        value: u64,
    },
}

impl MetricsData {
    /// Name of the processor that produced this payload.
    pub fn processor(&self) -> &str {
        match self {
            Self::Ttfb { processor, .. }
            | Self::Processing { processor, .. }
            | Self::LlmUsage { processor, .. }
            | Self::TtsUsage { processor, .. } => processor,
        }
    }
}

/// Accumulated usage for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageSummary {
    pub llm_prompt_tokens: u64,
    pub llm_completion_tokens: u64,
    pub llm_total_tokens: u64,
    pub tts_characters: u64,
}

impl fmt::Display for UsageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM prompt tokens: {}, completion tokens: {}, total: {}; TTS characters: {}",
            self.llm_prompt_tokens,
            self.llm_completion_tokens,
            self.llm_total_tokens,
            self.tts_characters
        )
    }
}

/// Folds metrics payloads into a session usage summary.
#[derive(Debug, Default)]
pub struct UsageCollector {
    summary: UsageSummary,
}

impl UsageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one metrics payload. Timing payloads are ignored; only
    /// usage payloads contribute to the summary.
    pub fn collect(&mut self, data: &MetricsData) {
        match data {
            MetricsData::LlmUsage { value, .. } => {
                self.summary.llm_prompt_tokens += value.prompt_tokens;
                self.summary.llm_completion_tokens += value.completion_tokens;
                self.summary.llm_total_tokens += value.total_tokens;
            }
            MetricsData::TtsUsage { value, .. } => {
                self.summary.tts_characters += value;
            }
            MetricsData::Ttfb { .. } | MetricsData::Processing { .. } => {}
        }
    }

    /// The usage accumulated so far.
    pub fn summary(&self) -> UsageSummary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttfb_serialization() {
        let data = MetricsData::Ttfb {
            processor: "openai_llm".to_string(),
            model: Some("gpt-4o-mini".to_string()),
            value: 0.235,
        };
        let json = serde_json::to_string(&data).expect("serialize");
        assert!(json.contains("\"metric\":\"ttfb\""));
        assert!(json.contains("0.235"));

        let back: MetricsData = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.processor(), "openai_llm");
    }

    #[test]
    fn collector_accumulates_llm_usage() {
        let mut collector = UsageCollector::new();
        collector.collect(&MetricsData::LlmUsage {
            processor: "openai_llm".into(),
            model: None,
            value: LLMTokenUsage {
                prompt_tokens: 100,
                completion_tokens: 40,
                total_tokens: 140,
            },
        });
        collector.collect(&MetricsData::LlmUsage {
            processor: "openai_llm".into(),
            model: None,
            value: LLMTokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
        });

        let summary = collector.summary();
        assert_eq!(summary.llm_prompt_tokens, 110);
        assert_eq!(summary.llm_completion_tokens, 45);
        assert_eq!(summary.llm_total_tokens, 155);
        assert_eq!(summary.tts_characters, 0);
    }

    #[test]
    fn collector_accumulates_tts_usage() {
        let mut collector = UsageCollector::new();
        collector.collect(&MetricsData::TtsUsage {
            processor: "elevenlabs_tts".into(),
            model: Some("eleven_turbo_v2_5".into()),
            value: 42,
        });
        collector.collect(&MetricsData::TtsUsage {
            processor: "elevenlabs_tts".into(),
            model: None,
            value: 8,
        });
        assert_eq!(collector.summary().tts_characters, 50);
    }

    #[test]
    fn collector_ignores_timing() {
        let mut collector = UsageCollector::new();
        collector.collect(&MetricsData::Ttfb {
            processor: "deepgram_stt".into(),
            model: None,
            value: 0.1,
        });
        collector.collect(&MetricsData::Processing {
            processor: "vad".into(),
            model: None,
            value: 0.001,
        });
        assert_eq!(collector.summary(), UsageSummary::default());
    }

    #[test]
    fn summary_display() {
        let summary = UsageSummary {
            llm_prompt_tokens: 1,
            llm_completion_tokens: 2,
            llm_total_tokens: 3,
            tts_characters: 4,
        };
        let shown = format!("{}", summary);
        assert!(shown.contains("total: 3"));
        assert!(shown.contains("TTS characters: 4"));
    }
}
