// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Agent definition and session lifecycle.
//!
//! An [`Agent`] is the static description of a conversational assistant:
//! system instructions, an optional greeting, and the tools it may call. An
//! [`AgentSession`] turns that description plus an [`AgentConfig`] into a
//! running pipeline, bridges it to one WebSocket peer at a time, and logs a
//! usage summary when the peer goes away.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMsg, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::frames::{EndFrame, FrameEnum, LLMRunFrame, StartFrame};
use crate::metrics::UsageCollector;
use crate::pipeline::{ChannelPipeline, PriorityReceiver};
use crate::processors::aggregators::context::{ChatContext, SharedChatContext};
use crate::processors::aggregators::sentence::SentenceAggregator;
use crate::processors::aggregators::turn::{AssistantContextAggregator, UserContextAggregator};
use crate::processors::processor::Processor;
use crate::processors::vad::VadProcessor;
use crate::serializers::json::JsonFrameSerializer;
use crate::serializers::{FrameSerializer, SerializedFrame};
use crate::services::deepgram::DeepgramSttService;
use crate::services::elevenlabs::ElevenLabsTtsService;
use crate::services::openai::OpenAiLlmService;
use crate::tools::{FunctionTool, LookupWeather, ToolExecutor, ToolRegistry};
use crate::transport::livekit::RoomSession;
use crate::transport::websocket::PeerHandler;
use crate::audio::VadParams;

const DEFAULT_INSTRUCTIONS: &str = "You are a helpful voice assistant. \
     You interact with users through speech, so keep your responses concise \
     and direct. You are curious and friendly, with a sense of humor.";

const DEFAULT_GREETING: &str = "Greet the user and ask about their day.";

/// ElevenLabs voice used unless overridden.
const DEFAULT_VOICE_ID: &str = "Ir1QNHvhaJXbAGhT50w3";

const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Static description of a conversational assistant.
pub struct Agent {
    instructions: String,
    greeting_instructions: Option<String>,
    tools: ToolRegistry,
    voice_id: String,
    llm_model: String,
}

impl Agent {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            greeting_instructions: None,
            tools: ToolRegistry::new(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
        }
    }

    /// Instructions for a generated reply sent when the session starts,
    /// before the user has said anything.
    pub fn with_greeting(mut self, instructions: impl Into<String>) -> Self {
        self.greeting_instructions = Some(instructions.into());
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn FunctionTool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_voice_id(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    pub fn with_llm_model(mut self, model: impl Into<String>) -> Self {
        self.llm_model = model.into();
        self
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}

impl Default for Agent {
    /// The stock assistant: friendly voice persona, opening greeting, and
    /// the demo weather tool.
    fn default() -> Self {
        Agent::new(DEFAULT_INSTRUCTIONS)
            .with_greeting(DEFAULT_GREETING)
            .with_tool(Arc::new(LookupWeather))
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("instructions", &self.instructions)
            .field("greeting_instructions", &self.greeting_instructions)
            .field("tools", &self.tools)
            .field("voice_id", &self.voice_id)
            .field("llm_model", &self.llm_model)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// AgentSession
// ---------------------------------------------------------------------------

/// Runs an [`Agent`] against connected peers, one session at a time.
pub struct AgentSession {
    config: AgentConfig,
    agent: Agent,
    room: Option<RoomSession>,
}

impl AgentSession {
    pub fn new(config: AgentConfig, agent: Agent) -> Self {
        Self {
            config,
            agent,
            room: None,
        }
    }

    /// Attach the LiveKit room session this agent is serving.
    pub fn with_room(mut self, room: RoomSession) -> Self {
        self.room = Some(room);
        self
    }

    pub fn room(&self) -> Option<&RoomSession> {
        self.room.as_ref()
    }

    /// Assemble the processing pipeline for one session.
    ///
    /// Stage order is load-bearing: STT consumes audio before the context
    /// aggregator sees transcripts, the tool executor sits directly after
    /// the LLM so tool results loop straight back upstream, and the
    /// assistant aggregator sits after TTS so it records exactly the text
    /// that was spoken.
    /// Build the shared conversation context: system instructions, tool
    /// definitions, and the greeting prompt when one is configured. The
    /// greeting lands in the history before any peer audio, so the LLM opens
    /// the conversation.
    fn build_context(&self) -> SharedChatContext {
        let tool_defs = if self.agent.tools.is_empty() {
            None
        } else {
            Some(self.agent.tools.definitions())
        };
        let mut chat = ChatContext::with_instructions(&self.agent.instructions, tool_defs);
        if let Some(greeting) = &self.agent.greeting_instructions {
            chat.add_message_value(json!({ "role": "system", "content": greeting }));
        }
        chat.shared()
    }

    fn build_pipeline(&self) -> ChannelPipeline {
        let context = self.build_context();

        let processors: Vec<Box<dyn Processor>> = vec![
            Box::new(VadProcessor::new(VadParams::default())),
            Box::new(
                DeepgramSttService::new(&self.config.deepgram_api_key)
                    .with_model("nova-2")
                    .with_language("en"),
            ),
            Box::new(UserContextAggregator::new(context.clone())),
            Box::new(
                OpenAiLlmService::new(&self.config.openai_api_key, context.clone())
                    .with_model(&self.agent.llm_model)
                    .with_temperature(0.4),
            ),
            Box::new(ToolExecutor::new(Arc::new(self.agent.tools.clone()))),
            Box::new(SentenceAggregator::new()),
            Box::new(
                ElevenLabsTtsService::new(&self.config.eleven_api_key, &self.agent.voice_id)
                    .with_model("eleven_turbo_v2_5"),
            ),
            Box::new(AssistantContextAggregator::new(context.clone())),
        ];

        ChannelPipeline::new(processors)
    }

    /// Run one session over a connected WebSocket peer until it disconnects
    /// or a fatal error ends the session.
    pub async fn run(&self, socket: WebSocket) {
        if let Some(room) = &self.room {
            match room.participant_count().await {
                Ok(n) => {
                    tracing::info!(room = room.room_name(), participants = n, "session starting")
                }
                Err(e) => tracing::warn!("cannot query room participants: {e}"),
            }
        }

        let mut pipeline = self.build_pipeline();
        let Some(output_rx) = pipeline.take_output() else {
            tracing::error!("pipeline output already taken");
            return;
        };
        let Some(upstream_rx) = pipeline.take_upstream() else {
            tracing::error!("pipeline upstream already taken");
            return;
        };

        let serializer: Arc<dyn FrameSerializer> = Arc::new(JsonFrameSerializer::new());
        let done = CancellationToken::new();

        pipeline.send(FrameEnum::Start(StartFrame::default())).await;
        if self.agent.greeting_instructions.is_some() {
            pipeline.send(FrameEnum::LLMRun(LLMRunFrame::new())).await;
        }

        let (ws_sender, mut ws_receiver) = socket.split();

        let write_task = tokio::spawn(write_loop(
            output_rx,
            ws_sender,
            serializer.clone(),
            done.clone(),
        ));
        let upstream_task = tokio::spawn(upstream_loop(upstream_rx, done.clone()));

        // Read loop: peer frames into the pipeline until disconnect or until
        // the session is marked done (fatal error or End frame flowed out).
        loop {
            let msg = tokio::select! {
                _ = done.cancelled() => break,
                msg = ws_receiver.next() => msg,
            };
            match msg {
                Some(Ok(WsMsg::Text(text))) => {
                    if let Some(frame) = serializer.deserialize(text.as_bytes()) {
                        let ends_session = matches!(frame, FrameEnum::End(_));
                        pipeline.send(frame).await;
                        if ends_session {
                            break;
                        }
                    }
                }
                Some(Ok(WsMsg::Binary(data))) => {
                    if let Some(frame) = serializer.deserialize(&data) {
                        pipeline.send(frame).await;
                    }
                }
                Some(Ok(WsMsg::Close(_))) | None => {
                    tracing::info!("peer disconnected");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("peer socket error: {e}");
                    break;
                }
            }
        }

        pipeline.send(FrameEnum::End(EndFrame::new())).await;
        done.cancel();

        let usage = match write_task.await {
            Ok(collector) => collector.summary(),
            Err(e) => {
                tracing::error!("write task failed: {e}");
                Default::default()
            }
        };
        let _ = upstream_task.await;
        pipeline.shutdown().await;

        tracing::info!(%usage, "session usage");
    }
}

#[async_trait]
impl PeerHandler for AgentSession {
    async fn handle(&self, socket: WebSocket) {
        self.run(socket).await;
    }
}

/// Drains pipeline output to the peer socket, collecting metrics along the
/// way. Ends on `End`, on a fatal error frame, or when the session is
/// cancelled.
async fn write_loop(
    mut output_rx: PriorityReceiver,
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, WsMsg>,
    serializer: Arc<dyn FrameSerializer>,
    done: CancellationToken,
) -> UsageCollector {
    let mut collector = UsageCollector::new();

    loop {
        let directed = tokio::select! {
            _ = done.cancelled() => break,
            directed = output_rx.recv() => match directed {
                Some(d) => d,
                None => break,
            },
        };

        match &directed.frame {
            FrameEnum::Metrics(m) => {
                for data in &m.data {
                    tracing::debug!(?data, "metrics");
                    collector.collect(data);
                }
                continue;
            }
            FrameEnum::Error(e) if e.fatal => {
                tracing::error!(error = %e.error, "fatal error, ending session");
                if let Some(serialized) = serializer.serialize(&directed.frame) {
                    send_serialized(&mut ws_sender, serialized).await;
                }
                done.cancel();
                break;
            }
            FrameEnum::Error(e) => {
                tracing::warn!(error = %e.error, "turn aborted");
            }
            _ => {}
        }

        let ends_session = matches!(directed.frame, FrameEnum::End(_));
        if let Some(serialized) = serializer.serialize(&directed.frame) {
            if !send_serialized(&mut ws_sender, serialized).await {
                done.cancel();
                break;
            }
        }
        if ends_session {
            done.cancel();
            break;
        }
    }

    collector
}

async fn send_serialized(
    ws_sender: &mut futures_util::stream::SplitSink<WebSocket, WsMsg>,
    serialized: SerializedFrame,
) -> bool {
    let msg = match serialized {
        SerializedFrame::Text(t) => WsMsg::Text(t.into()),
        SerializedFrame::Binary(b) => WsMsg::Binary(b.into()),
    };
    ws_sender.send(msg).await.is_ok()
}

/// Watches frames that travel upstream past the first processor. Service
/// errors surface here; a fatal one ends the session.
async fn upstream_loop(mut upstream_rx: PriorityReceiver, done: CancellationToken) {
    loop {
        let directed = tokio::select! {
            _ = done.cancelled() => break,
            directed = upstream_rx.recv() => match directed {
                Some(d) => d,
                None => break,
            },
        };
        if let FrameEnum::Error(e) = &directed.frame {
            if e.fatal {
                tracing::error!(error = %e.error, "fatal service error, ending session");
                done.cancel();
                break;
            }
            tracing::warn!(error = %e.error, "service error, turn aborted");
        }
    }
}
