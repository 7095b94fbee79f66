// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Agent configuration loaded from the environment.

use std::fmt;

use crate::error::AgentError;

/// Environment variables the agent requires, in reporting order.
const REQUIRED_VARS: [&str; 6] = [
    "OPENAI_API_KEY",
    "DEEPGRAM_API_KEY",
    "ELEVEN_API_KEY",
    "LIVEKIT_URL",
    "LIVEKIT_API_KEY",
    "LIVEKIT_API_SECRET",
];

/// Credentials and endpoints for one agent process.
///
/// All six variables are mandatory; a single missing variable fails startup
/// with an error naming every variable that is absent, so a bare environment
/// produces one actionable message rather than six consecutive failures.
#[derive(Clone)]
pub struct AgentConfig {
    pub openai_api_key: String,
    pub deepgram_api_key: String,
    pub eleven_api_key: String,
    pub livekit_url: String,
    pub livekit_api_key: String,
    pub livekit_api_secret: String,
}

impl AgentConfig {
    /// Load the configuration from process environment variables.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = Vec::with_capacity(REQUIRED_VARS.len());
        let mut missing = Vec::new();
        for name in REQUIRED_VARS {
            match lookup(name).filter(|v| !v.trim().is_empty()) {
                Some(value) => values.push(value),
                None => missing.push(name),
            }
        }

        if !missing.is_empty() {
            return Err(AgentError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let mut values = values.into_iter();
        // Order matches REQUIRED_VARS.
        Ok(Self {
            openai_api_key: values.next().unwrap_or_default(),
            deepgram_api_key: values.next().unwrap_or_default(),
            eleven_api_key: values.next().unwrap_or_default(),
            livekit_url: values.next().unwrap_or_default(),
            livekit_api_key: values.next().unwrap_or_default(),
            livekit_api_secret: values.next().unwrap_or_default(),
        })
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("openai_api_key", &"[REDACTED]")
            .field("deepgram_api_key", &"[REDACTED]")
            .field("eleven_api_key", &"[REDACTED]")
            .field("livekit_url", &self.livekit_url)
            .field("livekit_api_key", &self.livekit_api_key)
            .field("livekit_api_secret", &"[REDACTED]")
            .finish()
    }
}
