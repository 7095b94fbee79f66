// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! OpenAI streaming chat-completion LLM service.
//!
//! Runs inference against `/v1/chat/completions` (or any compatible API)
//! whenever an `LLMRunFrame` arrives. The conversation lives in a shared
//! [`ChatContext`](crate::processors::aggregators::ChatContext); each run
//! snapshots the messages, streams the SSE response, and emits
//! `LLMResponseStartFrame`, a `TextFrame` per content delta, and
//! `LLMResponseEndFrame`. Tool calls in the response are collected and
//! emitted as a `FunctionCallsStartedFrame`; the matching
//! `FunctionCallResultFrame`s are buffered until every call has resolved,
//! then the context is extended and a single follow-up run issued.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::frames::{
    ErrorFrame, FrameEnum, FunctionCallFromLLM, FunctionCallResultFrame,
    FunctionCallsStartedFrame, LLMResponseEndFrame, LLMResponseStartFrame, MetricsFrame,
    TextFrame,
};
use crate::impl_processor_debug_display;
use crate::metrics::{LLMTokenUsage, MetricsData};
use crate::processors::aggregators::SharedChatContext;
use crate::processors::processor::{Processor, ProcessorContext, ProcessorWeight};
use crate::processors::FrameDirection;
use crate::services::AIService;
use crate::utils::obj_id;

// ---------------------------------------------------------------------------
// Wire types (subset needed for streaming)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChunkToolCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<ChunkFunction>,
}

#[derive(Debug, Deserialize)]
struct ChunkFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

// ---------------------------------------------------------------------------
// OpenAiLlmService
// ---------------------------------------------------------------------------

/// OpenAI chat-completion LLM service with streaming SSE support.
pub struct OpenAiLlmService {
    name: String,
    id: u64,
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
    context: SharedChatContext,
    temperature: Option<f64>,
    max_tokens: Option<u64>,
    /// Tool calls issued by the last run that have not resolved yet.
    pending_tool_calls: usize,
    pending_results: Vec<FunctionCallResultFrame>,
}

impl_processor_debug_display!(OpenAiLlmService);

impl OpenAiLlmService {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o";
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com";

    pub fn new(api_key: impl Into<String>, context: SharedChatContext) -> Self {
        Self {
            name: "openai_llm".to_string(),
            id: obj_id(),
            api_key: api_key.into(),
            model: Self::DEFAULT_MODEL.to_string(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(90))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            context,
            temperature: None,
            max_tokens: None,
            pending_tool_calls: 0,
            pending_results: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    async fn build_request(&self) -> ChatCompletionRequest {
        let (messages, tools) = {
            let chat = self.context.lock().await;
            (chat.messages_for_api(), chat.tools().map(<[_]>::to_vec))
        };
        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            stream: true,
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
        }
    }

    /// Stream one chat completion, emitting frames as deltas arrive.
    async fn run_inference(&mut self, ctx: &ProcessorContext) {
        // A fresh run supersedes any outstanding tool calls.
        self.pending_tool_calls = 0;
        self.pending_results.clear();

        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request().await;
        let started = Instant::now();

        debug!(model = %self.model, messages = body.messages.len(), "starting chat completion");

        let response = match self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                error!(error = %e, "chat completion request failed");
                ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                    format!("LLM request failed: {e}"),
                    false,
                )));
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "OpenAI API error");
            ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                format!("OpenAI API error (HTTP {status}): {error_body}"),
                false,
            )));
            return;
        }

        ctx.send_downstream(FrameEnum::LLMResponseStart(LLMResponseStartFrame::new()));

        // SSE parsing state. Tool-call deltas are keyed by index and can
        // split names and arguments across chunks.
        let mut first_token_at: Option<Duration> = None;
        let mut functions: Vec<String> = Vec::new();
        let mut arguments: Vec<String> = Vec::new();
        let mut tool_ids: Vec<String> = Vec::new();
        let mut current_idx = 0usize;
        let mut current_name = String::new();
        let mut current_args = String::new();
        let mut current_id = String::new();
        let mut line_buffer = String::with_capacity(256);

        let mut byte_stream = response.bytes_stream();
        'stream: while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    error!(error = %e, "SSE stream read error");
                    ctx.send_upstream(FrameEnum::Error(ErrorFrame::new(
                        format!("SSE stream read error: {e}"),
                        false,
                    )));
                    break;
                }
            };

            let Ok(text) = std::str::from_utf8(&chunk) else {
                warn!("non-UTF-8 data in SSE stream, skipping chunk");
                continue;
            };
            line_buffer.push_str(text);

            while let Some(newline) = line_buffer.find('\n') {
                let line: String = line_buffer[..newline].to_string();
                line_buffer.drain(..=newline);

                let line = line.trim();
                let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                    continue;
                };
                if data == "[DONE]" {
                    break 'stream;
                }

                let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(error = %e, "failed to parse SSE chunk");
                        continue;
                    }
                };

                if let Some(usage) = &chunk.usage {
                    ctx.send_downstream(FrameEnum::Metrics(MetricsFrame::new(vec![
                        MetricsData::LlmUsage {
                            processor: self.name.clone(),
                            model: Some(self.model.clone()),
                            value: LLMTokenUsage {
                                prompt_tokens: usage.prompt_tokens,
                                completion_tokens: usage.completion_tokens,
                                total_tokens: usage.total_tokens,
                            },
                        },
                    ])));
                }

                let Some(delta) = chunk.choices.first().and_then(|c| c.delta.as_ref()) else {
                    continue;
                };

                if let Some(tool_calls) = &delta.tool_calls {
                    for call in tool_calls {
                        if call.index != current_idx {
                            functions.push(std::mem::take(&mut current_name));
                            arguments.push(std::mem::take(&mut current_args));
                            tool_ids.push(std::mem::take(&mut current_id));
                            current_idx = call.index;
                        }
                        if let Some(func) = &call.function {
                            if let Some(name) = &func.name {
                                current_name.push_str(name);
                            }
                            if let Some(args) = &func.arguments {
                                current_args.push_str(args);
                            }
                        }
                        if let Some(id) = &call.id {
                            current_id = id.clone();
                        }
                    }
                } else if let Some(content) = &delta.content {
                    if !content.is_empty() {
                        if first_token_at.is_none() {
                            first_token_at = Some(started.elapsed());
                        }
                        ctx.send_downstream(FrameEnum::Text(TextFrame::new(content.clone())));
                    }
                }
            }
        }

        if let Some(ttfb) = first_token_at {
            ctx.send_downstream(FrameEnum::Metrics(MetricsFrame::new(vec![
                MetricsData::Ttfb {
                    processor: self.name.clone(),
                    model: Some(self.model.clone()),
                    value: ttfb.as_secs_f64(),
                },
            ])));
        }

        if !current_name.is_empty() {
            functions.push(current_name);
            arguments.push(current_args);
            tool_ids.push(current_id);
        }

        if !functions.is_empty() {
            let mut function_calls = Vec::with_capacity(functions.len());
            for ((name, args_str), tool_id) in functions.into_iter().zip(arguments).zip(tool_ids) {
                let parsed_args: serde_json::Value =
                    serde_json::from_str(&args_str).unwrap_or_else(|e| {
                        warn!(error = %e, raw = %args_str, "unparseable tool call arguments");
                        serde_json::Value::Object(serde_json::Map::new())
                    });
                function_calls.push(FunctionCallFromLLM {
                    function_name: name,
                    tool_call_id: tool_id,
                    arguments: parsed_args,
                });
            }
            debug!(count = function_calls.len(), "LLM requested tool calls");
            self.pending_tool_calls = function_calls.len();
            ctx.send_downstream(FrameEnum::FunctionCallsStarted(
                FunctionCallsStartedFrame::new(function_calls),
            ));
        }

        ctx.send_downstream(FrameEnum::LLMResponseEnd(LLMResponseEndFrame::new()));
    }

    /// Record a completed round of tool invocations in the shared context:
    /// one assistant message carrying every call, then one tool message per
    /// result. The follow-up run sees the calls and results paired up the
    /// way the API expects.
    async fn append_tool_results(&self, results: &[FunctionCallResultFrame]) {
        let tool_calls: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.tool_call_id,
                    "type": "function",
                    "function": {
                        "name": r.function_name,
                        "arguments": r.arguments.to_string(),
                    }
                })
            })
            .collect();

        let mut chat = self.context.lock().await;
        chat.add_message_value(serde_json::json!({
            "role": "assistant",
            "tool_calls": tool_calls,
        }));
        for r in results {
            chat.add_message_value(serde_json::json!({
                "role": "tool",
                "tool_call_id": r.tool_call_id,
                "content": r.result.to_string(),
            }));
        }
    }
}

#[async_trait]
impl Processor for OpenAiLlmService {
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
            FrameEnum::LLMRun(_) => {
                self.run_inference(ctx).await;
            }
            FrameEnum::FunctionCallResult(result) => {
                debug!(
                    function = %result.function_name,
                    outstanding = self.pending_tool_calls.saturating_sub(self.pending_results.len() + 1),
                    "tool result received"
                );
                self.pending_results.push(result);
                if self.pending_results.len() >= self.pending_tool_calls {
                    let results = std::mem::take(&mut self.pending_results);
                    self.append_tool_results(&results).await;
                    self.run_inference(ctx).await;
                }
            }
            other => ctx.send(other, direction),
        }
    }
}

#[async_trait]
impl AIService for OpenAiLlmService {
    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::aggregators::ChatContext;

    #[tokio::test]
    async fn request_snapshots_shared_context() {
        let context = ChatContext::with_instructions(
            "You are helpful.",
            Some(vec![serde_json::json!({
                "type": "function",
                "function": {"name": "lookup_weather", "parameters": {}}
            })]),
        )
        .shared();
        context.lock().await.add_user_message("hi");

        let svc = OpenAiLlmService::new("sk-test", context);
        let req = svc.build_request().await;

        assert!(req.stream);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0]["role"], "system");
        assert_eq!(req.messages[1]["content"], "hi");
        assert_eq!(req.tools.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn default_model_applied() {
        let svc = OpenAiLlmService::new("sk-test", ChatContext::new().shared());
        assert_eq!(svc.model, OpenAiLlmService::DEFAULT_MODEL);
    }

    #[test]
    fn builder_overrides() {
        let svc = OpenAiLlmService::new("sk-test", ChatContext::new().shared())
            .with_model("gpt-4o-mini")
            .with_base_url("https://llm.example.com")
            .with_temperature(0.7)
            .with_max_tokens(1024);
        assert_eq!(svc.model, "gpt-4o-mini");
        assert_eq!(svc.base_url, "https://llm.example.com");
        assert_eq!(svc.temperature, Some(0.7));
        assert_eq!(svc.max_tokens, Some(1024));
    }

    fn tool_result(name: &str, id: &str) -> FunctionCallResultFrame {
        FunctionCallResultFrame::new(
            name.to_string(),
            id.to_string(),
            serde_json::json!({"location": "Oslo"}),
            serde_json::json!({"conditions": "cloudy"}),
        )
    }

    #[tokio::test]
    async fn tool_results_extend_context() {
        let context = ChatContext::new().shared();
        let svc = OpenAiLlmService::new("sk-test", context.clone());

        svc.append_tool_results(&[tool_result("lookup_weather", "call_123")])
            .await;

        let chat = context.lock().await;
        assert_eq!(chat.message_count(), 2);
        assert_eq!(chat.messages()[0]["role"], "assistant");
        assert_eq!(
            chat.messages()[0]["tool_calls"][0]["function"]["name"],
            "lookup_weather"
        );
        assert_eq!(chat.messages()[1]["role"], "tool");
        assert_eq!(chat.messages()[1]["tool_call_id"], "call_123");
    }

    // Two parallel tool calls: the first result alone must not touch the
    // context or trigger a follow-up run. Once both are in, the context gets
    // one assistant message carrying both calls plus one tool message per
    // result, and inference runs exactly once (observable here as a single
    // error from the unreachable endpoint).
    #[tokio::test]
    async fn parallel_tool_results_run_inference_once() {
        use tokio::sync::mpsc;

        let context = ChatContext::new().shared();
        let mut svc = OpenAiLlmService::new("sk-test", context.clone())
            .with_base_url("http://127.0.0.1:9");
        svc.pending_tool_calls = 2;

        let (dtx, _drx) = mpsc::unbounded_channel();
        let (utx, mut urx) = mpsc::unbounded_channel();
        let ctx = ProcessorContext::for_test(dtx, utx);

        svc.process(
            FrameEnum::FunctionCallResult(tool_result("lookup_weather", "call_1")),
            FrameDirection::Upstream,
            &ctx,
        )
        .await;
        assert_eq!(context.lock().await.message_count(), 0);
        assert!(urx.try_recv().is_err());

        svc.process(
            FrameEnum::FunctionCallResult(tool_result("lookup_weather", "call_2")),
            FrameDirection::Upstream,
            &ctx,
        )
        .await;

        {
            let chat = context.lock().await;
            assert_eq!(chat.message_count(), 3);
            assert_eq!(
                chat.messages()[0]["tool_calls"].as_array().map(Vec::len),
                Some(2)
            );
            assert_eq!(chat.messages()[1]["tool_call_id"], "call_1");
            assert_eq!(chat.messages()[2]["tool_call_id"], "call_2");
        }

        assert!(matches!(urx.try_recv(), Ok(FrameEnum::Error(_))));
        assert!(urx.try_recv().is_err());
    }

    #[test]
    fn parse_content_chunk() {
        let raw = r#"{"choices":[{"index":0,"delta":{"content":"Hello"}}]}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(raw).unwrap();
        let delta = chunk.choices[0].delta.as_ref().unwrap();
        assert_eq!(delta.content.as_deref(), Some("Hello"));
    }

    #[test]
    fn parse_tool_call_chunk() {
        let raw = r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"lookup_weather","arguments":"{\"location\":"}}]}}]}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(raw).unwrap();
        let delta = chunk.choices[0].delta.as_ref().unwrap();
        let calls = delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.as_ref().unwrap().name.as_deref(), Some("lookup_weather"));
    }

    #[test]
    fn parse_usage_chunk() {
        let raw = r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":20,"total_tokens":30}}"#;
        let chunk: ChatCompletionChunk = serde_json::from_str(raw).unwrap();
        let usage = chunk.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 20);
        assert_eq!(usage.total_tokens, 30);
    }
}
