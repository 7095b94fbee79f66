// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Aggregation processors: conversation context, turn assembly, and
//! sentence buffering.

pub mod context;
pub mod sentence;
pub mod turn;

pub use context::{ChatContext, SharedChatContext};
pub use sentence::SentenceAggregator;
pub use turn::{AssistantContextAggregator, UserContextAggregator};
