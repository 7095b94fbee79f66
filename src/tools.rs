// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Function tools the LLM can invoke.
//!
//! A [`FunctionTool`] exposes a name, a description and a JSON Schema for
//! its arguments; the [`ToolRegistry`] renders these as OpenAI tool
//! definitions for the chat completion request. The [`ToolExecutor`]
//! processor sits downstream of the LLM service, runs the requested tools,
//! and pushes each result back upstream so the LLM can continue the turn.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::frames::{FrameEnum, FunctionCallResultFrame};
use crate::processors::processor::{Processor, ProcessorContext, ProcessorWeight};
use crate::processors::FrameDirection;

/// An async function the LLM may call during a turn.
#[async_trait]
pub trait FunctionTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema describing the tool arguments.
    fn parameters(&self) -> Value;

    /// Run the tool. Errors are reported back to the LLM as a result
    /// payload, never surfaced to the user directly.
    async fn call(&self, arguments: Value) -> Result<Value, String>;
}

/// Named collection of tools exposed to the LLM.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn FunctionTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn FunctionTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn FunctionTool>> {
        self.tools.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions in OpenAI chat completion format.
    pub fn definitions(&self) -> Vec<Value> {
        let mut defs: Vec<Value> = self
            .tools
            .values()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.parameters(),
                    }
                })
            })
            .collect();
        // HashMap iteration order is unstable; keep requests deterministic.
        defs.sort_by(|a, b| {
            let name = |v: &Value| v["function"]["name"].as_str().unwrap_or("").to_string();
            name(a).cmp(&name(b))
        });
        defs
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

// ---------------------------------------------------------------------------
// ToolExecutor
// ---------------------------------------------------------------------------

/// Runs registered tools when the LLM requests them.
///
/// `FunctionCallsStarted` frames are consumed; each completed call produces
/// a `FunctionCallResult` frame sent upstream to the LLM service, which
/// extends the context and re-runs inference.
pub struct ToolExecutor {
    name: &'static str,
    id: u64,
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            name: "tool_executor",
            id: crate::utils::obj_id(),
            registry,
        }
    }
}

crate::impl_processor_debug_display!(ToolExecutor);

#[async_trait]
impl Processor for ToolExecutor {
    fn name(&self) -> &str {
        self.name
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn weight(&self) -> ProcessorWeight {
        ProcessorWeight::Standard
    }

    async fn process(&mut self, frame: FrameEnum, direction: FrameDirection, ctx: &ProcessorContext) {
        match frame {
            FrameEnum::FunctionCallsStarted(started) => {
                for call in started.function_calls {
                    let result = match self.registry.get(&call.function_name) {
                        Some(tool) => {
                            tracing::info!(tool = %call.function_name, "running tool");
                            match tool.call(call.arguments.clone()).await {
                                Ok(value) => value,
                                Err(e) => {
                                    tracing::warn!(tool = %call.function_name, "tool failed: {e}");
                                    json!({ "error": e })
                                }
                            }
                        }
                        None => {
                            tracing::warn!(tool = %call.function_name, "unknown tool requested");
                            json!({ "error": format!("unknown tool: {}", call.function_name) })
                        }
                    };

                    ctx.send_upstream(FrameEnum::FunctionCallResult(FunctionCallResultFrame::new(
                        call.function_name,
                        call.tool_call_id,
                        call.arguments,
                        result,
                    )));
                }
            }
            other => ctx.send(other, direction),
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in demo tool
// ---------------------------------------------------------------------------

/// Demo weather lookup. Returns a canned payload; the schema instructs the
/// model to estimate coordinates itself instead of asking the user.
pub struct LookupWeather;

#[async_trait]
impl FunctionTool for LookupWeather {
    fn name(&self) -> &str {
        "lookup_weather"
    }

    fn description(&self) -> &str {
        "Look up current weather information for a location. \
         Estimate the latitude and longitude of the location yourself; \
         do not ask the user for them."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The location to look up weather for"
                },
                "latitude": {
                    "type": "string",
                    "description": "Estimated latitude of the location"
                },
                "longitude": {
                    "type": "string",
                    "description": "Estimated longitude of the location"
                }
            },
            "required": ["location", "latitude", "longitude"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, String> {
        let location = arguments["location"].as_str().unwrap_or("unknown");
        tracing::info!(location, "looking up weather");
        Ok(json!({
            "weather": "sunny",
            "temperature": 70,
            "location": location,
        }))
    }
}
