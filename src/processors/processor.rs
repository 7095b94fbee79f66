// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Processor trait with explicit context passing.
//!
//! - **Explicit context**: [`ProcessorContext`] carries channel senders for
//!   downstream/upstream frame delivery.
//! - **ProcessorWeight**: categorizes processor cost so the pipeline can size
//!   its data channels.
//! - **No base struct requirement**: processors only implement the trait.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::frames::FrameEnum;
use crate::processors::FrameDirection;

// ---------------------------------------------------------------------------
// ProcessorWeight
// ---------------------------------------------------------------------------

/// Categorizes the computational cost of a processor.
///
/// Used by the pipeline to size the bounded data channel feeding the
/// processor: heavier processors get deeper buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessorWeight {
    /// Pass-through, filters, simple transforms.
    Light,
    /// Aggregators, state machines, moderate computation.
    #[default]
    Standard,
    /// Network-bound services: STT, LLM, TTS.
    Heavy,
}

impl fmt::Display for ProcessorWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => write!(f, "Light"),
            Self::Standard => write!(f, "Standard"),
            Self::Heavy => write!(f, "Heavy"),
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessorContext
// ---------------------------------------------------------------------------

/// Context provided to processors during frame processing.
///
/// Carries the channel senders for downstream/upstream frame delivery and a
/// cancellation token for cooperative shutdown.
pub struct ProcessorContext {
    /// Channel sender for downstream frames (unbounded to prevent deadlock).
    downstream_tx: mpsc::UnboundedSender<FrameEnum>,
    /// Channel sender for upstream frames (unbounded to prevent deadlock).
    upstream_tx: mpsc::UnboundedSender<FrameEnum>,
    /// Cancellation token for cooperative shutdown.
    cancel_token: CancellationToken,
}

impl ProcessorContext {
    pub fn new(
        downstream_tx: mpsc::UnboundedSender<FrameEnum>,
        upstream_tx: mpsc::UnboundedSender<FrameEnum>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            downstream_tx,
            upstream_tx,
            cancel_token,
        }
    }

    /// Create a context suitable for unit tests.
    #[cfg(test)]
    pub fn for_test(
        downstream_tx: mpsc::UnboundedSender<FrameEnum>,
        upstream_tx: mpsc::UnboundedSender<FrameEnum>,
    ) -> Self {
        Self::new(downstream_tx, upstream_tx, CancellationToken::new())
    }

    /// Send a frame downstream (input → output direction).
    ///
    /// Synchronous unbounded send; never blocks. Logs a warning if the
    /// receiver is gone (e.g. during shutdown).
    pub fn send_downstream(&self, frame: FrameEnum) {
        if self.downstream_tx.send(frame).is_err() {
            tracing::warn!("ProcessorContext: downstream receiver dropped, frame lost");
        }
    }

    /// Send a frame upstream (output → input direction).
    pub fn send_upstream(&self, frame: FrameEnum) {
        if self.upstream_tx.send(frame).is_err() {
            tracing::warn!("ProcessorContext: upstream receiver dropped, frame lost");
        }
    }

    /// Send a frame in the specified direction.
    pub fn send(&self, frame: FrameEnum, direction: FrameDirection) {
        match direction {
            FrameDirection::Downstream => self.send_downstream(frame),
            FrameDirection::Upstream => self.send_upstream(frame),
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Cancellation token for cooperative shutdown. Long-running `process()`
    /// loops (e.g. SSE streaming) should select on this.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Clone of the downstream sender for background tasks.
    ///
    /// WebSocket reader loops and similar processor-internal tasks use this
    /// to push frames into the pipeline while no `process()` call is running.
    pub fn downstream_sender(&self) -> mpsc::UnboundedSender<FrameEnum> {
        self.downstream_tx.clone()
    }

    /// Clone of the upstream sender for background tasks.
    pub fn upstream_sender(&self) -> mpsc::UnboundedSender<FrameEnum> {
        self.upstream_tx.clone()
    }
}

impl fmt::Debug for ProcessorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorContext")
            .field("cancelled", &self.cancel_token.is_cancelled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Processor trait
// ---------------------------------------------------------------------------

/// A pipeline stage.
///
/// Processors receive frames one at a time via [`process`](Processor::process)
/// and emit output frames through the [`ProcessorContext`]. Frames a processor
/// does not handle should be forwarded in their original direction so the
/// rest of the pipeline still sees them.
#[async_trait]
pub trait Processor: Send + Sync + fmt::Debug + fmt::Display {
    /// Human-readable name for logging and metrics.
    fn name(&self) -> &str;

    /// Unique identifier for this processor instance.
    fn id(&self) -> u64;

    /// Computational weight used to size the data channel.
    fn weight(&self) -> ProcessorWeight {
        ProcessorWeight::Standard
    }

    /// Process a single frame, using the context to send output frames.
    async fn process(
        &mut self,
        frame: FrameEnum,
        direction: FrameDirection,
        ctx: &ProcessorContext,
    );

    /// Lifecycle: called once when the pipeline starts.
    async fn setup(&mut self) {}

    /// Lifecycle: called once when the pipeline shuts down.
    async fn cleanup(&mut self) {}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
