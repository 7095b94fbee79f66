// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! ElevenLabs text-to-speech services.
//!
//! Two variants:
//!
//! - [`ElevenLabsTtsService`]: WebSocket streaming against
//!   `wss://api.elevenlabs.io/v1/text-to-speech/{voice_id}/stream-input`.
//!   Audio chunks arrive incrementally for low latency.
//! - [`ElevenLabsHttpTtsService`]: one `POST` per sentence against
//!   `/v1/text-to-speech/{voice_id}/stream`. Simpler, higher latency.
//!
//! Both synthesize each incoming `TextFrame` into `TTSStartedFrame`,
//! `TTSAudioRawFrame` chunks and a `TTSStoppedFrame`, then forward the text
//! frame itself so downstream aggregation still sees the reply.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::frames::{
    ErrorFrame, FrameEnum, MetricsFrame, TTSAudioRawFrame, TTSStartedFrame, TTSStoppedFrame,
};
use crate::impl_processor_debug_display;
use crate::metrics::MetricsData;
use crate::processors::processor::{Processor, ProcessorContext, ProcessorWeight};
use crate::processors::FrameDirection;
use crate::services::AIService;
use crate::utils::obj_id;

// ---------------------------------------------------------------------------
// Configuration types
// ---------------------------------------------------------------------------

/// Voice characteristics sent with the first message of a generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElevenLabsVoiceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_boost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_speaker_boost: Option<bool>,
}

impl ElevenLabsVoiceSettings {
    fn is_empty(&self) -> bool {
        self.stability.is_none()
            && self.similarity_boost.is_none()
            && self.style.is_none()
            && self.use_speaker_boost.is_none()
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WsRequest {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_settings: Option<ElevenLabsVoiceSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    xi_api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WsResponse {
    #[serde(default)]
    audio: Option<String>,
    #[serde(default, rename = "isFinal")]
    is_final: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct HttpRequest {
    text: String,
    model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_settings: Option<ElevenLabsVoiceSettings>,
}

/// Map an ElevenLabs `pcm_*` output format to its sample rate.
fn sample_rate_from_output_format(format: &str) -> u32 {
    match format {
        "pcm_8000" => 8000,
        "pcm_16000" => 16000,
        "pcm_22050" => 22050,
        "pcm_24000" => 24000,
        "pcm_44100" => 44100,
        _ => 24000,
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// ---------------------------------------------------------------------------
// ElevenLabsTtsService (WebSocket streaming)
// ---------------------------------------------------------------------------

/// ElevenLabs streaming TTS over WebSocket.
pub struct ElevenLabsTtsService {
    name: String,
    id: u64,
    api_key: String,
    voice_id: String,
    model: String,
    output_format: String,
    sample_rate: u32,
    ws_base_url: String,
    voice_settings: ElevenLabsVoiceSettings,
    ws: Arc<Mutex<Option<WsStream>>>,
}

impl_processor_debug_display!(ElevenLabsTtsService);

impl ElevenLabsTtsService {
    pub const DEFAULT_MODEL: &'static str = "eleven_turbo_v2_5";
    pub const DEFAULT_OUTPUT_FORMAT: &'static str = "pcm_24000";
    pub const DEFAULT_WS_BASE_URL: &'static str = "wss://api.elevenlabs.io";

    pub fn new(api_key: impl Into<String>, voice_id: impl Into<String>) -> Self {
        let output_format = Self::DEFAULT_OUTPUT_FORMAT.to_string();
        let sample_rate = sample_rate_from_output_format(&output_format);
        Self {
            name: "elevenlabs_tts".to_string(),
            id: obj_id(),
            api_key: api_key.into(),
            voice_id: voice_id.into(),
            model: Self::DEFAULT_MODEL.to_string(),
            output_format,
            sample_rate,
            ws_base_url: Self::DEFAULT_WS_BASE_URL.to_string(),
            voice_settings: ElevenLabsVoiceSettings::default(),
            ws: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self.sample_rate = sample_rate_from_output_format(&self.output_format);
        self
    }

    pub fn with_voice_settings(mut self, settings: ElevenLabsVoiceSettings) -> Self {
        self.voice_settings = settings;
        self
    }

    pub fn with_ws_base_url(mut self, url: impl Into<String>) -> Self {
        self.ws_base_url = url.into();
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn build_ws_url(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream-input?model_id={}&output_format={}",
            self.ws_base_url, self.voice_id, self.model, self.output_format
        )
    }

    /// Open the WebSocket if not already connected.
    async fn connect(&self) -> Result<(), String> {
        let mut guard = self.ws.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let url = self.build_ws_url();
        tracing::debug!(url = %url, "connecting to ElevenLabs");

        match tokio::time::timeout(
            Duration::from_secs(10),
            tokio_tungstenite::connect_async(&url),
        )
        .await
        {
            Ok(Ok((stream, _))) => {
                tracing::info!("ElevenLabs connected");
                *guard = Some(stream);
                Ok(())
            }
            Ok(Err(e)) => Err(format!("ElevenLabs connection failed: {e}")),
            Err(_) => Err("ElevenLabs connection timed out after 10s".to_string()),
        }
    }

    async fn disconnect(&self) {
        let mut guard = self.ws.lock().await;
        if let Some(ref mut ws) = *guard {
            if let Err(e) = ws.close(None).await {
                tracing::debug!(error = %e, "error closing ElevenLabs WebSocket");
            }
        }
        *guard = None;
    }

    fn voice_settings_payload(&self) -> Option<ElevenLabsVoiceSettings> {
        if self.voice_settings.is_empty() {
            None
        } else {
            Some(self.voice_settings.clone())
        }
    }

    /// Synthesize one sentence.
    ///
    /// Protocol: send the text with voice settings and API key, flush with
    /// `{"text": ""}`, then read base64 audio chunks until `isFinal`. The
    /// flush ends the generation, so the socket is dropped afterwards and
    /// each sentence opens a fresh connection.
    async fn synthesize(&mut self, text: &str, ctx: &ProcessorContext) {
        let request = WsRequest {
            text: text.to_string(),
            voice_settings: self.voice_settings_payload(),
            xi_api_key: Some(self.api_key.clone()),
        };
        let request_json = match serde_json::to_string(&request) {
            Ok(json) => json,
            Err(e) => {
                ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                    format!("failed to serialize TTS request: {e}"),
                    false,
                )));
                return;
            }
        };

        let started = Instant::now();
        let mut first_audio_at: Option<Duration> = None;

        let mut guard = self.ws.lock().await;
        let Some(ws) = guard.as_mut() else {
            ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                "ElevenLabs WebSocket not connected",
                false,
            )));
            return;
        };

        if let Err(e) = ws.send(WsMessage::Text(request_json)).await {
            drop(guard);
            self.disconnect().await;
            ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                format!("failed to send TTS request: {e}"),
                false,
            )));
            return;
        }
        if let Err(e) = ws.send(WsMessage::Text(r#"{"text": ""}"#.to_string())).await {
            tracing::warn!(error = %e, "failed to send TTS flush message");
        }

        ctx.send_downstream(FrameEnum::TTSStarted(TTSStartedFrame::new()));
        tracing::debug!(text = %text, "TTS request sent");

        loop {
            let msg = match ws.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                        format!("ElevenLabs receive error: {e}"),
                        false,
                    )));
                    break;
                }
                None => {
                    ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                        "ElevenLabs connection closed unexpectedly",
                        false,
                    )));
                    break;
                }
            };

            let text_data = match msg {
                WsMessage::Text(t) => t,
                WsMessage::Close(_) => {
                    tracing::debug!("ElevenLabs closed the connection");
                    break;
                }
                _ => continue,
            };

            let response: WsResponse = match serde_json::from_str(&text_data) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "unparseable ElevenLabs message");
                    continue;
                }
            };

            if let Some(error) = response.error {
                tracing::error!(error = %error, "ElevenLabs reported an error");
                ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                    format!("ElevenLabs error: {error}"),
                    false,
                )));
                break;
            }

            if let Some(audio_b64) = response.audio.filter(|a| !a.is_empty()) {
                match base64::engine::general_purpose::STANDARD.decode(&audio_b64) {
                    Ok(audio) if !audio.is_empty() => {
                        if first_audio_at.is_none() {
                            first_audio_at = Some(started.elapsed());
                        }
                        ctx.send_downstream(FrameEnum::TTSAudioRaw(TTSAudioRawFrame::new(
                            audio,
                            self.sample_rate,
                            1,
                        )));
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "failed to decode audio chunk"),
                }
            }

            if response.is_final == Some(true) {
                break;
            }
        }

        // The empty-text flush ends the generation, so the socket is spent
        // once the read loop exits. Drop it; the next sentence reconnects.
        *guard = None;
        drop(guard);

        let mut metrics = vec![MetricsData::TtsUsage {
            processor: self.name.clone(),
            model: Some(self.model.clone()),
            value: text.chars().count() as u64,
        }];
        if let Some(ttfb) = first_audio_at {
            tracing::debug!(ttfb_ms = ttfb.as_millis(), "TTS time to first byte");
            metrics.push(MetricsData::Ttfb {
                processor: self.name.clone(),
                model: Some(self.model.clone()),
                value: ttfb.as_secs_f64(),
            });
        }
        ctx.send_downstream(FrameEnum::Metrics(MetricsFrame::new(metrics)));

        ctx.send_downstream(FrameEnum::TTSStopped(TTSStoppedFrame::new()));
    }
}

#[async_trait]
impl Processor for ElevenLabsTtsService {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn weight(&self) -> ProcessorWeight {
        ProcessorWeight::Heavy
    }

    async fn process(
        &mut self,
        frame: FrameEnum,
        direction: FrameDirection,
        ctx: &ProcessorContext,
    ) {
        match frame {
            FrameEnum::Text(ref t) if !t.text.is_empty() => {
                // Reconnect lazily; the previous generation may have closed
                // the socket.
                if let Err(e) = self.connect().await {
                    ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(e, false)));
                } else {
                    self.synthesize(&t.text, ctx).await;
                }
                // The sentence continues downstream for context aggregation.
                ctx.send(frame, direction);
            }
            FrameEnum::Start(_) => {
                if let Err(e) = self.connect().await {
                    ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(e, false)));
                }
                ctx.send(frame, direction);
            }
            FrameEnum::End(_) | FrameEnum::Cancel(_) => {
                self.disconnect().await;
                ctx.send(frame, direction);
            }
            other => ctx.send(other, direction),
        }
    }

    async fn cleanup(&mut self) {
        self.disconnect().await;
    }
}

#[async_trait]
impl AIService for ElevenLabsTtsService {
    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }

    async fn stop(&mut self) {
        self.disconnect().await;
    }

    async fn cancel(&mut self) {
        self.disconnect().await;
    }
}

// ---------------------------------------------------------------------------
// ElevenLabsHttpTtsService
// ---------------------------------------------------------------------------

/// ElevenLabs TTS over the HTTP REST API. One request per sentence; the
/// full audio arrives in a single response.
pub struct ElevenLabsHttpTtsService {
    name: String,
    id: u64,
    api_key: String,
    voice_id: String,
    model: String,
    output_format: String,
    sample_rate: u32,
    base_url: String,
    voice_settings: ElevenLabsVoiceSettings,
    client: reqwest::Client,
}

impl_processor_debug_display!(ElevenLabsHttpTtsService);

impl ElevenLabsHttpTtsService {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.elevenlabs.io";

    pub fn new(api_key: impl Into<String>, voice_id: impl Into<String>) -> Self {
        let output_format = ElevenLabsTtsService::DEFAULT_OUTPUT_FORMAT.to_string();
        let sample_rate = sample_rate_from_output_format(&output_format);
        Self {
            name: "elevenlabs_http_tts".to_string(),
            id: obj_id(),
            api_key: api_key.into(),
            voice_id: voice_id.into(),
            model: ElevenLabsTtsService::DEFAULT_MODEL.to_string(),
            output_format,
            sample_rate,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            voice_settings: ElevenLabsVoiceSettings::default(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self.sample_rate = sample_rate_from_output_format(&self.output_format);
        self
    }

    pub fn with_voice_settings(mut self, settings: ElevenLabsVoiceSettings) -> Self {
        self.voice_settings = settings;
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn synthesize(&mut self, text: &str, ctx: &ProcessorContext) {
        let url = format!(
            "{}/v1/text-to-speech/{}/stream?output_format={}",
            self.base_url, self.voice_id, self.output_format
        );
        let body = HttpRequest {
            text: text.to_string(),
            model_id: self.model.clone(),
            voice_settings: if self.voice_settings.is_empty() {
                None
            } else {
                Some(self.voice_settings.clone())
            },
        };

        let started = Instant::now();
        ctx.send_downstream(FrameEnum::TTSStarted(TTSStartedFrame::new()));

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                Ok(audio) if !audio.is_empty() => {
                    let ttfb = started.elapsed();
                    ctx.send_downstream(FrameEnum::TTSAudioRaw(TTSAudioRawFrame::new(
                        audio.to_vec(),
                        self.sample_rate,
                        1,
                    )));
                    ctx.send_downstream(FrameEnum::Metrics(MetricsFrame::new(vec![
                        MetricsData::TtsUsage {
                            processor: self.name.clone(),
                            model: Some(self.model.clone()),
                            value: text.chars().count() as u64,
                        },
                        MetricsData::Ttfb {
                            processor: self.name.clone(),
                            model: Some(self.model.clone()),
                            value: ttfb.as_secs_f64(),
                        },
                    ])));
                }
                Ok(_) => {}
                Err(e) => {
                    ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                        format!("failed to read TTS audio: {e}"),
                        false,
                    )));
                }
            },
            Ok(resp) => {
                let status = resp.status();
                let error_text = resp.text().await.unwrap_or_default();
                ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                    format!("ElevenLabs API error (HTTP {status}): {error_text}"),
                    false,
                )));
            }
            Err(e) => {
                ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                    format!("ElevenLabs request failed: {e}"),
                    false,
                )));
            }
        }

        ctx.send_downstream(FrameEnum::TTSStopped(TTSStoppedFrame::new()));
    }
}

#[async_trait]
impl Processor for ElevenLabsHttpTtsService {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn weight(&self) -> ProcessorWeight {
        ProcessorWeight::Heavy
    }

    async fn process(
        &mut self,
        frame: FrameEnum,
        direction: FrameDirection,
        ctx: &ProcessorContext,
    ) {
        match frame {
            FrameEnum::Text(ref t) if !t.text.is_empty() => {
                self.synthesize(&t.text, ctx).await;
                ctx.send(frame, direction);
            }
            other => ctx.send(other, direction),
        }
    }
}

#[async_trait]
impl AIService for ElevenLabsHttpTtsService {
    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_sample_rates() {
        assert_eq!(sample_rate_from_output_format("pcm_8000"), 8000);
        assert_eq!(sample_rate_from_output_format("pcm_16000"), 16000);
        assert_eq!(sample_rate_from_output_format("pcm_22050"), 22050);
        assert_eq!(sample_rate_from_output_format("pcm_24000"), 24000);
        assert_eq!(sample_rate_from_output_format("pcm_44100"), 44100);
        assert_eq!(sample_rate_from_output_format("mp3_44100"), 24000);
    }

    #[test]
    fn ws_url_contains_voice_model_and_format() {
        let tts = ElevenLabsTtsService::new("key", "voice-abc").with_model("eleven_flash_v2_5");
        let url = tts.build_ws_url();
        assert!(url.starts_with("wss://api.elevenlabs.io/v1/text-to-speech/voice-abc/stream-input?"));
        assert!(url.contains("model_id=eleven_flash_v2_5"));
        assert!(url.contains("output_format=pcm_24000"));
    }

    #[test]
    fn output_format_updates_sample_rate() {
        let tts = ElevenLabsTtsService::new("key", "voice").with_output_format("pcm_16000");
        assert_eq!(tts.sample_rate(), 16000);
    }

    #[test]
    fn empty_voice_settings_omitted_from_request() {
        let tts = ElevenLabsTtsService::new("key", "voice");
        assert!(tts.voice_settings_payload().is_none());

        let tts = tts.with_voice_settings(ElevenLabsVoiceSettings {
            stability: Some(0.5),
            ..Default::default()
        });
        assert!(tts.voice_settings_payload().is_some());
    }

    #[test]
    fn ws_request_serialization_skips_none() {
        let request = WsRequest {
            text: "Hello.".to_string(),
            voice_settings: None,
            xi_api_key: Some("key".to_string()),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""text":"Hello.""#));
        assert!(json.contains(r#""xi_api_key":"key""#));
        assert!(!json.contains("voice_settings"));
    }

    #[test]
    fn ws_response_parses_audio_chunk() {
        let json = r#"{"audio": "AAAA", "isFinal": null}"#;
        let response: WsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.audio.as_deref(), Some("AAAA"));
        assert_ne!(response.is_final, Some(true));
    }

    #[test]
    fn ws_response_parses_final_marker() {
        let json = r#"{"isFinal": true}"#;
        let response: WsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.is_final, Some(true));
        assert!(response.audio.is_none());
    }

    #[test]
    fn ws_response_parses_error() {
        let json = r#"{"error": "quota exceeded"}"#;
        let response: WsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.error.as_deref(), Some("quota exceeded"));
    }

    // Each generation ends with the empty-text flush, after which the server
    // closes the socket. A multi-sentence reply must reconnect per sentence
    // instead of writing into the dead connection.
    #[tokio::test]
    async fn consecutive_sentences_reconnect_between_generations() {
        use tokio::net::TcpListener;
        use tokio::sync::mpsc;

        use crate::frames::TextFrame;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // One generation per connection: read until the flush, answer with a
        // single audio chunk marked final, then close.
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    while let Some(Ok(msg)) = ws.next().await {
                        if let WsMessage::Text(text) = msg {
                            let parsed: serde_json::Value =
                                serde_json::from_str(&text).unwrap();
                            if parsed["text"] == "" {
                                let audio = base64::engine::general_purpose::STANDARD
                                    .encode([0u8; 64]);
                                let reply =
                                    serde_json::json!({"audio": audio, "isFinal": true});
                                ws.send(WsMessage::Text(reply.to_string())).await.unwrap();
                                ws.close(None).await.ok();
                                return;
                            }
                        }
                    }
                });
            }
        });

        let mut tts = ElevenLabsTtsService::new("key", "voice")
            .with_ws_base_url(format!("ws://127.0.0.1:{port}"));

        let (dtx, mut drx) = mpsc::unbounded_channel();
        let (utx, mut urx) = mpsc::unbounded_channel();
        let ctx = ProcessorContext::for_test(dtx, utx);

        for sentence in ["First sentence.", "Second sentence."] {
            tts.process(
                FrameEnum::Text(TextFrame::new(sentence.to_string())),
                FrameDirection::Downstream,
                &ctx,
            )
            .await;

            assert!(matches!(drx.recv().await, Some(FrameEnum::TTSStarted(_))));
            assert!(matches!(drx.recv().await, Some(FrameEnum::TTSAudioRaw(_))));
            assert!(matches!(drx.recv().await, Some(FrameEnum::Metrics(_))));
            assert!(matches!(drx.recv().await, Some(FrameEnum::TTSStopped(_))));
            assert!(matches!(drx.recv().await, Some(FrameEnum::Text(_))));
        }

        assert!(urx.try_recv().is_err());
    }
}
