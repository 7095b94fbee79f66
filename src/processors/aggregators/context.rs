// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Conversation context shared across the pipeline.
//!
//! [`ChatContext`] stores the message history in OpenAI-compatible format
//! (as `serde_json::Value`), optional tool definitions, and an optional
//! system prompt. It is shared as `Arc<Mutex<ChatContext>>` between the user
//! aggregator (writes user turns), the assistant aggregator (writes
//! replies), the tool executor, and the LLM service (snapshots it per
//! inference).

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

/// Shared handle to a [`ChatContext`].
pub type SharedChatContext = Arc<Mutex<ChatContext>>;

/// Conversation state for one session. Not persisted.
#[derive(Debug, Clone, Default)]
pub struct ChatContext {
    /// Conversation messages in OpenAI-compatible format.
    messages: Vec<serde_json::Value>,
    /// Tool definitions offered to the LLM.
    tools: Option<Vec<serde_json::Value>>,
    /// System prompt prepended to every API call.
    system_prompt: Option<String>,
}

impl ChatContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with a system prompt and optional tool definitions.
    pub fn with_instructions(
        system_prompt: impl Into<String>,
        tools: Option<Vec<serde_json::Value>>,
    ) -> Self {
        Self {
            messages: Vec::new(),
            tools,
            system_prompt: Some(system_prompt.into()),
        }
    }

    /// Create a shared handle around this context.
    pub fn shared(self) -> SharedChatContext {
        Arc::new(Mutex::new(self))
    }

    /// Append a simple role/content message.
    pub fn add_message(&mut self, role: &str, content: &str) {
        self.messages.push(json!({
            "role": role,
            "content": content,
        }));
    }

    /// Append a pre-built message value. Used for structured messages such
    /// as assistant tool calls and tool results.
    pub fn add_message_value(&mut self, message: serde_json::Value) {
        self.messages.push(message);
    }

    pub fn add_user_message(&mut self, text: &str) {
        self.add_message("user", text);
    }

    pub fn add_assistant_message(&mut self, text: &str) {
        self.add_message("assistant", text);
    }

    pub fn add_system_message(&mut self, text: &str) {
        self.add_message("system", text);
    }

    /// The conversation messages, without the system prompt.
    pub fn messages(&self) -> &[serde_json::Value] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Messages formatted for the LLM API call: the system prompt (when set)
    /// prepended to the conversation history.
    pub fn messages_for_api(&self) -> Vec<serde_json::Value> {
        let mut result = Vec::with_capacity(self.messages.len() + 1);
        if let Some(ref prompt) = self.system_prompt {
            result.push(json!({
                "role": "system",
                "content": prompt,
            }));
        }
        result.extend(self.messages.iter().cloned());
        result
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn set_tools(&mut self, tools: Option<Vec<serde_json::Value>>) {
        self.tools = tools;
    }

    pub fn tools(&self) -> Option<&[serde_json::Value]> {
        self.tools.as_deref()
    }

    /// Drop the conversation history, keeping the system prompt and tools.
    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }
}
