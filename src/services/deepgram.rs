// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Deepgram streaming speech-to-text.
//!
//! Connects to Deepgram's WebSocket listen API on `StartFrame`, streams
//! inbound audio to it, and emits [`TranscriptionFrame`] (final) and
//! [`InterimTranscriptionFrame`] (partial) frames as results arrive. A
//! background reader task feeds results straight into the pipeline through
//! cloned context senders.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::frames::{
    ErrorFrame, FrameEnum, InterimTranscriptionFrame, TranscriptionFrame,
};
use crate::impl_processor_debug_display;
use crate::processors::processor::{Processor, ProcessorContext, ProcessorWeight};
use crate::processors::FrameDirection;
use crate::services::AIService;
use crate::utils::{now_timestamp, obj_id};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Minimal first parse to pick the message type without building a full
/// `serde_json::Value` tree.
#[derive(Deserialize)]
struct DgTypeOnly {
    #[serde(rename = "type")]
    msg_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DgAlternative {
    transcript: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct DgChannel {
    alternatives: Vec<DgAlternative>,
}

#[derive(Debug, Deserialize)]
struct DgResult {
    channel: Option<DgChannel>,
    is_final: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct DgError {
    description: Option<String>,
    message: Option<String>,
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// ---------------------------------------------------------------------------
// DeepgramSttService
// ---------------------------------------------------------------------------

/// Deepgram real-time speech-to-text service.
///
/// Consumes `InputAudioRawFrame`s; the audio does not continue past this
/// processor.
pub struct DeepgramSttService {
    name: String,
    id: u64,

    api_key: String,
    model: String,
    language: Option<String>,
    sample_rate: u32,
    encoding: String,
    channels: u32,
    interim_results: bool,
    punctuate: bool,
    smart_format: bool,
    utterance_end_ms: Option<u32>,
    user_id: String,
    base_url: Option<String>,

    ws_sender: Option<Arc<Mutex<WsSink>>>,
    ws_reader_task: Option<JoinHandle<()>>,
}

impl_processor_debug_display!(DeepgramSttService);

impl DeepgramSttService {
    /// Defaults: model `nova-2`, 16 kHz linear16 mono, interim results and
    /// punctuation enabled.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "deepgram_stt".to_string(),
            id: obj_id(),
            api_key: api_key.into(),
            model: "nova-2".to_string(),
            language: Some("en".to_string()),
            sample_rate: 16000,
            encoding: "linear16".to_string(),
            channels: 1,
            interim_results: true,
            punctuate: true,
            smart_format: false,
            utterance_end_ms: None,
            user_id: String::new(),
            base_url: None,
            ws_sender: None,
            ws_reader_task: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_interim_results(mut self, enabled: bool) -> Self {
        self.interim_results = enabled;
        self
    }

    pub fn with_punctuate(mut self, enabled: bool) -> Self {
        self.punctuate = enabled;
        self
    }

    pub fn with_smart_format(mut self, enabled: bool) -> Self {
        self.smart_format = enabled;
        self
    }

    pub fn with_utterance_end_ms(mut self, ms: u32) -> Self {
        self.utterance_end_ms = Some(ms);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    fn build_ws_url(&self) -> String {
        let host = self
            .base_url
            .as_deref()
            .unwrap_or("wss://api.deepgram.com")
            .trim_end_matches('/');

        let mut url = format!(
            "{}/v1/listen?model={}&encoding={}&sample_rate={}&channels={}",
            host, self.model, self.encoding, self.sample_rate, self.channels,
        );

        if let Some(ref lang) = self.language {
            let _ = write!(url, "&language={}", lang);
        }
        if self.interim_results {
            url.push_str("&interim_results=true");
        }
        if self.punctuate {
            url.push_str("&punctuate=true");
        }
        if self.smart_format {
            url.push_str("&smart_format=true");
        }
        if let Some(ms) = self.utterance_end_ms {
            let _ = write!(url, "&utterance_end_ms={}", ms);
        }

        url
    }

    /// Open the WebSocket and spawn the reader task. Results flow into the
    /// pipeline through cloned context senders, so they arrive even while
    /// this processor is idle.
    async fn connect(&mut self, ctx: &ProcessorContext) -> Result<(), String> {
        let url = self.build_ws_url();
        tracing::debug!(url = %url, "connecting to Deepgram");

        let mut request = url
            .into_client_request()
            .map_err(|e| format!("failed to build WebSocket request: {e}"))?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Token {}", self.api_key))
                .map_err(|e| format!("invalid API key header value: {e}"))?,
        );

        let (ws_stream, _) =
            match tokio::time::timeout(Duration::from_secs(10), connect_async(request)).await {
                Ok(Ok(ok)) => ok,
                Ok(Err(e)) => return Err(format!("WebSocket connection failed: {e}")),
                Err(_) => return Err("WebSocket connection timed out after 10s".to_string()),
            };

        tracing::info!("Deepgram connected");

        let (sink, stream) = ws_stream.split();
        self.ws_sender = Some(Arc::new(Mutex::new(sink)));

        let downstream = ctx.downstream_sender();
        let upstream = ctx.upstream_sender();
        let user_id = self.user_id.clone();
        self.ws_reader_task = Some(tokio::spawn(async move {
            Self::reader_loop(stream, downstream, upstream, user_id).await;
        }));

        Ok(())
    }

    async fn reader_loop(
        mut stream: WsStream,
        downstream: mpsc::UnboundedSender<FrameEnum>,
        upstream: mpsc::UnboundedSender<FrameEnum>,
        user_id: String,
    ) {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    Self::handle_message(&text, &downstream, &upstream, &user_id);
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "Deepgram closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Deepgram WebSocket read error");
                    let _ = upstream.send(FrameEnum::Error(ErrorFrame::new(
                        format!("Deepgram read error: {e}"),
                        false,
                    )));
                    break;
                }
            }
        }
        tracing::debug!("Deepgram reader loop ended");
    }

    fn handle_message(
        text: &str,
        downstream: &mpsc::UnboundedSender<FrameEnum>,
        upstream: &mpsc::UnboundedSender<FrameEnum>,
        user_id: &str,
    ) {
        let envelope: DgTypeOnly = match serde_json::from_str(text) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable Deepgram message");
                return;
            }
        };

        match envelope.msg_type.as_deref().unwrap_or("") {
            "Results" => match serde_json::from_str::<DgResult>(text) {
                Ok(result) => Self::handle_result(result, downstream, user_id),
                Err(e) => tracing::warn!(error = %e, "unparseable Results message"),
            },
            "Error" => {
                let description = serde_json::from_str::<DgError>(text)
                    .ok()
                    .and_then(|e| e.description.or(e.message))
                    .unwrap_or_else(|| "unknown Deepgram error".to_string());
                tracing::error!(error = %description, "Deepgram reported an error");
                let _ = upstream.send(FrameEnum::Error(ErrorFrame::new(
                    format!("Deepgram error: {description}"),
                    false,
                )));
            }
            "Metadata" | "UtteranceEnd" | "SpeechStarted" => {}
            other => tracing::trace!(msg_type = other, "unhandled Deepgram message"),
        }
    }

    fn handle_result(
        result: DgResult,
        downstream: &mpsc::UnboundedSender<FrameEnum>,
        user_id: &str,
    ) {
        let Some(channel) = result.channel else {
            return;
        };
        let Some(alternative) = channel.alternatives.first() else {
            return;
        };
        if alternative.transcript.is_empty() {
            return;
        }

        let transcript = alternative.transcript.clone();
        let timestamp = now_timestamp();
        let frame = if result.is_final.unwrap_or(false) {
            tracing::debug!(text = %transcript, confidence = alternative.confidence, "final transcription");
            FrameEnum::Transcription(TranscriptionFrame::new(
                transcript,
                user_id.to_string(),
                timestamp,
            ))
        } else {
            tracing::trace!(text = %transcript, "interim transcription");
            FrameEnum::InterimTranscription(InterimTranscriptionFrame::new(
                transcript,
                user_id.to_string(),
                timestamp,
            ))
        };
        let _ = downstream.send(frame);
    }

    async fn disconnect(&mut self) {
        if let Some(sender) = self.ws_sender.take() {
            let mut sink = sender.lock().await;
            if let Err(e) = sink
                .send(Message::Text(r#"{"type": "CloseStream"}"#.to_string()))
                .await
            {
                tracing::debug!(error = %e, "error sending CloseStream");
            }
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "error closing Deepgram sink");
            }
        }

        if let Some(handle) = self.ws_reader_task.take() {
            let abort = handle.abort_handle();
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Deepgram reader task failed"),
                Err(_) => {
                    tracing::warn!("Deepgram reader task timed out, aborting");
                    abort.abort();
                }
            }
        }
    }
}

#[async_trait]
impl Processor for DeepgramSttService {
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
            FrameEnum::Start(ref start) => {
                if start.audio_in_sample_rate > 0 {
                    self.sample_rate = start.audio_in_sample_rate;
                }
                if let Err(e) = self.connect(ctx).await {
                    tracing::error!(error = %e, "Deepgram connection failed");
                    ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                        format!("Deepgram connection failed: {e}"),
                        true,
                    )));
                }
                ctx.send(frame, direction);
            }
            FrameEnum::InputAudioRaw(input) => {
                if let Some(sender) = self.ws_sender.clone() {
                    let mut sink = sender.lock().await;
                    if let Err(e) = sink.send(Message::Binary(input.audio.audio)).await {
                        tracing::error!(error = %e, "failed to send audio to Deepgram");
                        drop(sink);
                        self.ws_sender = None;
                        ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                            format!("failed to send audio to Deepgram: {e}"),
                            false,
                        )));
                    }
                } else {
                    tracing::warn!("audio received but Deepgram is not connected");
                }
                // Audio stops here. Transcripts continue downstream instead.
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
impl AIService for DeepgramSttService {
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

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn ws_url_defaults() {
        let stt = DeepgramSttService::new("test-key");
        let url = stt.build_ws_url();
        assert!(url.starts_with("wss://api.deepgram.com/v1/listen?"));
        assert!(url.contains("model=nova-2"));
        assert!(url.contains("encoding=linear16"));
        assert!(url.contains("sample_rate=16000"));
        assert!(url.contains("channels=1"));
        assert!(url.contains("language=en"));
        assert!(url.contains("interim_results=true"));
        assert!(url.contains("punctuate=true"));
    }

    #[test]
    fn ws_url_custom() {
        let stt = DeepgramSttService::new("test-key")
            .with_model("nova-3")
            .with_sample_rate(48000)
            .with_language("es")
            .with_smart_format(true)
            .with_utterance_end_ms(1000)
            .with_base_url("wss://dg.example.com/");

        let url = stt.build_ws_url();
        assert!(url.starts_with("wss://dg.example.com/v1/listen?"));
        assert!(url.contains("model=nova-3"));
        assert!(url.contains("sample_rate=48000"));
        assert!(url.contains("language=es"));
        assert!(url.contains("smart_format=true"));
        assert!(url.contains("utterance_end_ms=1000"));
    }

    fn channels() -> (
        mpsc::UnboundedSender<FrameEnum>,
        mpsc::UnboundedReceiver<FrameEnum>,
        mpsc::UnboundedSender<FrameEnum>,
        mpsc::UnboundedReceiver<FrameEnum>,
    ) {
        let (dtx, drx) = mpsc::unbounded_channel();
        let (utx, urx) = mpsc::unbounded_channel();
        (dtx, drx, utx, urx)
    }

    #[test]
    fn final_result_becomes_transcription_frame() {
        let (dtx, mut drx, utx, _urx) = channels();
        let json = r#"{
            "type": "Results",
            "channel": {
                "alternatives": [{"transcript": "hello world", "confidence": 0.98}]
            },
            "is_final": true
        }"#;

        DeepgramSttService::handle_message(json, &dtx, &utx, "user-1");

        match drx.try_recv().unwrap() {
            FrameEnum::Transcription(t) => {
                assert_eq!(t.text, "hello world");
                assert_eq!(t.user_id, "user-1");
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn interim_result_becomes_interim_frame() {
        let (dtx, mut drx, utx, _urx) = channels();
        let json = r#"{
            "type": "Results",
            "channel": {
                "alternatives": [{"transcript": "hel", "confidence": 0.7}]
            },
            "is_final": false
        }"#;

        DeepgramSttService::handle_message(json, &dtx, &utx, "user-2");

        match drx.try_recv().unwrap() {
            FrameEnum::InterimTranscription(t) => assert_eq!(t.text, "hel"),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn empty_transcript_is_ignored() {
        let (dtx, mut drx, utx, _urx) = channels();
        let json = r#"{
            "type": "Results",
            "channel": {"alternatives": [{"transcript": "", "confidence": 0.0}]},
            "is_final": true
        }"#;

        DeepgramSttService::handle_message(json, &dtx, &utx, "user");
        assert!(drx.try_recv().is_err());
    }

    #[test]
    fn server_error_surfaces_upstream() {
        let (dtx, _drx, utx, mut urx) = channels();
        let json = r#"{"type": "Error", "description": "Rate limit exceeded"}"#;

        DeepgramSttService::handle_message(json, &dtx, &utx, "user");

        match urx.try_recv().unwrap() {
            FrameEnum::Error(e) => {
                assert!(e.error.contains("Rate limit exceeded"));
                assert!(!e.fatal);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn metadata_is_silently_ignored() {
        let (dtx, mut drx, utx, mut urx) = channels();
        DeepgramSttService::handle_message(r#"{"type": "Metadata"}"#, &dtx, &utx, "user");
        assert!(drx.try_recv().is_err());
        assert!(urx.try_recv().is_err());
    }

    #[test]
    fn model_accessor() {
        let stt = DeepgramSttService::new("key").with_model("nova-3");
        assert_eq!(AIService::model(&stt), Some("nova-3"));
    }
}
