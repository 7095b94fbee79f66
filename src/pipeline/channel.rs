// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Channel-based pipeline where each processor runs on its own tokio task.
//!
//! Key properties:
//!
//! - **Priority channels**: System frames (lifecycle, speech events, errors)
//!   use unbounded channels checked first via `select! { biased; ... }`, so
//!   they are never blocked by backpressure. Data and control frames share a
//!   bounded FIFO channel, so boundary signals (e.g. `LLMResponseEnd`) can
//!   never overtake the content they terminate.
//! - **Bounded data channels**: sized by processor weight (Light=32,
//!   Standard=64, Heavy=128).
//! - **Task isolation**: each processor runs on its own tokio task; a turn is
//!   therefore processed serially per stage, in arrival order.
//! - **JoinSet lifecycle**: all processor tasks are tracked via
//!   `tokio::task::JoinSet` for clean shutdown.
//! - **Panic containment**: a panicking processor emits a fatal `ErrorFrame`
//!   downstream instead of tearing down the process.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::frames::{ErrorFrame, FrameEnum, FrameKind};
use crate::processors::processor::{Processor, ProcessorContext, ProcessorWeight};
use crate::processors::FrameDirection;

// ---------------------------------------------------------------------------
// Priority channel
// ---------------------------------------------------------------------------

/// Capacity for bounded data channels based on processor weight.
fn data_channel_capacity(weight: ProcessorWeight) -> usize {
    match weight {
        ProcessorWeight::Light => 32,
        ProcessorWeight::Standard => 64,
        ProcessorWeight::Heavy => 128,
    }
}

/// A frame tagged with its flow direction.
pub struct DirectedFrame {
    pub frame: FrameEnum,
    pub direction: FrameDirection,
}

/// Sender half of a priority channel pair.
///
/// System frames go to the unbounded priority channel; data and control
/// frames go to the bounded FIFO channel.
#[derive(Clone)]
pub struct PrioritySender {
    priority_tx: mpsc::UnboundedSender<DirectedFrame>,
    data_tx: mpsc::Sender<DirectedFrame>,
}

impl PrioritySender {
    /// Send a frame, routing by frame kind.
    pub async fn send(&self, frame: FrameEnum, direction: FrameDirection) {
        let directed = DirectedFrame { frame, direction };
        if directed.frame.kind() == FrameKind::System {
            if self.priority_tx.send(directed).is_err() {
                tracing::warn!("PrioritySender: priority receiver dropped, frame lost");
            }
        } else if self.data_tx.send(directed).await.is_err() {
            tracing::warn!("PrioritySender: data receiver dropped, frame lost");
        }
    }
}

/// Receiver half of a priority channel pair.
pub struct PriorityReceiver {
    priority_rx: mpsc::UnboundedReceiver<DirectedFrame>,
    data_rx: mpsc::Receiver<DirectedFrame>,
}

impl PriorityReceiver {
    /// Receive the next frame, preferring system frames over data frames.
    pub async fn recv(&mut self) -> Option<DirectedFrame> {
        tokio::select! {
            biased;
            Some(frame) = self.priority_rx.recv() => Some(frame),
            Some(frame) = self.data_rx.recv() => Some(frame),
            else => None,
        }
    }

    /// Non-blocking receive, system frames first.
    pub fn try_recv(&mut self) -> Option<DirectedFrame> {
        if let Ok(frame) = self.priority_rx.try_recv() {
            return Some(frame);
        }
        self.data_rx.try_recv().ok()
    }
}

/// Create a priority channel pair with the given data channel capacity.
fn priority_channel(data_capacity: usize) -> (PrioritySender, PriorityReceiver) {
    let (priority_tx, priority_rx) = mpsc::unbounded_channel();
    let (data_tx, data_rx) = mpsc::channel(data_capacity);
    (
        PrioritySender {
            priority_tx,
            data_tx,
        },
        PriorityReceiver {
            priority_rx,
            data_rx,
        },
    )
}

// ---------------------------------------------------------------------------
// ChannelPipeline
// ---------------------------------------------------------------------------

/// A channel-based pipeline where each processor runs on its own tokio task.
///
/// ```text
/// [input] --> [proc 0 task] --> [proc 1 task] --> ... --> [output]
///                ^                   |
///                |____(upstream)_____|
/// ```
///
/// Each processor has an input [`PriorityReceiver`] and a
/// [`ProcessorContext`] with senders to push output frames in either
/// direction. Upstream frames emitted by the first processor surface on the
/// pipeline's upstream receiver.
pub struct ChannelPipeline {
    /// Frames sent here enter the first processor.
    input_tx: PrioritySender,
    /// Frames exiting the last processor (downstream) appear here.
    output_rx: Option<PriorityReceiver>,
    /// Frames sent upstream past the first processor appear here.
    upstream_rx: Option<PriorityReceiver>,
    /// All processor tasks.
    join_set: JoinSet<()>,
    /// Cooperative shutdown.
    cancel_token: CancellationToken,
}

impl ChannelPipeline {
    /// Build a pipeline from an ordered list of processors.
    pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
        let cancel_token = CancellationToken::new();
        let mut join_set = JoinSet::new();
        let n = processors.len();

        if n == 0 {
            let (input_tx, output_rx) = priority_channel(64);
            return Self {
                input_tx,
                output_rx: Some(output_rx),
                upstream_rx: None,
                join_set,
                cancel_token,
            };
        }

        // N+1 downstream channel pairs: input → proc[0] → ... → proc[n-1] → output.
        let caps: Vec<usize> = processors
            .iter()
            .map(|p| data_channel_capacity(p.weight()))
            .chain(std::iter::once(64))
            .collect();
        let mut down_txs: Vec<PrioritySender> = Vec::with_capacity(n + 1);
        let mut down_rxs: Vec<Option<PriorityReceiver>> = Vec::with_capacity(n + 1);
        for cap in caps {
            let (tx, rx) = priority_channel(cap);
            down_txs.push(tx);
            down_rxs.push(Some(rx));
        }

        // N+1 upstream channel pairs. Upstream traffic is light.
        let mut up_txs: Vec<PrioritySender> = Vec::with_capacity(n + 1);
        let mut up_rxs: Vec<Option<PriorityReceiver>> = Vec::with_capacity(n + 1);
        for _ in 0..=n {
            let (tx, rx) = priority_channel(32);
            up_txs.push(tx);
            up_rxs.push(Some(rx));
        }

        let pipeline_input_tx = down_txs[0].clone();
        let pipeline_output_rx = down_rxs[n].take();
        let pipeline_upstream_rx = up_rxs[0].take();

        for (i, processor) in processors.into_iter().enumerate() {
            let mut down_rx = match down_rxs[i].take() {
                Some(rx) => rx,
                None => unreachable!("down_rx taken twice"),
            };
            let mut up_rx = match up_rxs[i + 1].take() {
                Some(rx) => rx,
                None => unreachable!("up_rx taken twice"),
            };
            let downstream_tx = down_txs[i + 1].clone();
            let upstream_tx = up_txs[i].clone();
            let token = cancel_token.clone();

            // Context channels are unbounded to prevent deadlock; they are
            // drained into the priority channels after each process() call.
            let (ctx_down_tx, mut ctx_down_rx) = mpsc::unbounded_channel::<FrameEnum>();
            let (ctx_up_tx, mut ctx_up_rx) = mpsc::unbounded_channel::<FrameEnum>();
            let ctx = ProcessorContext::new(ctx_down_tx, ctx_up_tx, token.clone());

            let mut processor = processor;
            join_set.spawn(async move {
                processor.setup().await;
                tracing::debug!(processor = %processor.name(), "pipeline: processor started");

                loop {
                    // Context channels are also polled so frames produced by
                    // processor-internal tasks (e.g. WebSocket reader loops)
                    // are forwarded even when no input frames are arriving.
                    let directed = tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        Some(d) = down_rx.recv() => d,
                        Some(d) = up_rx.recv() => d,
                        Some(frame) = ctx_down_rx.recv() => {
                            downstream_tx.send(frame, FrameDirection::Downstream).await;
                            continue;
                        }
                        Some(frame) = ctx_up_rx.recv() => {
                            upstream_tx.send(frame, FrameDirection::Upstream).await;
                            continue;
                        }
                        else => break,
                    };

                    tracing::trace!(
                        processor = %processor.name(),
                        frame = %directed.frame,
                        direction = ?directed.direction,
                        "pipeline: dispatching"
                    );

                    let result = AssertUnwindSafe(processor.process(
                        directed.frame,
                        directed.direction,
                        &ctx,
                    ))
                    .catch_unwind()
                    .await;

                    if let Err(panic_info) = result {
                        let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                            s.to_string()
                        } else if let Some(s) = panic_info.downcast_ref::<String>() {
                            s.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        tracing::error!(processor = %processor.name(), "processor panicked: {msg}");
                        // Sent directly to the downstream channel (not through
                        // ctx) since the context drain below will not run.
                        downstream_tx
                            .send(
                                FrameEnum::Error(ErrorFrame::new(
                                    format!("processor {} panicked: {msg}", processor.name()),
                                    true,
                                )),
                                FrameDirection::Downstream,
                            )
                            .await;
                        break;
                    }

                    // Forward all output from processing frame N before
                    // consuming frame N+1, preserving ordering.
                    while let Ok(frame) = ctx_down_rx.try_recv() {
                        downstream_tx.send(frame, FrameDirection::Downstream).await;
                    }
                    while let Ok(frame) = ctx_up_rx.try_recv() {
                        upstream_tx.send(frame, FrameDirection::Upstream).await;
                    }
                }

                processor.cleanup().await;
                tracing::debug!(processor = %processor.name(), "pipeline: processor stopped");
            });
        }

        Self {
            input_tx: pipeline_input_tx,
            output_rx: pipeline_output_rx,
            upstream_rx: pipeline_upstream_rx,
            join_set,
            cancel_token,
        }
    }

    /// The pipeline's input sender for injecting frames.
    pub fn input(&self) -> &PrioritySender {
        &self.input_tx
    }

    /// Take the downstream output receiver. Can only be taken once.
    pub fn take_output(&mut self) -> Option<PriorityReceiver> {
        self.output_rx.take()
    }

    /// Take the upstream output receiver. Can only be taken once.
    pub fn take_upstream(&mut self) -> Option<PriorityReceiver> {
        self.upstream_rx.take()
    }

    /// Cancellation token shared by all processor tasks.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Send a frame into the pipeline (downstream direction).
    pub async fn send(&self, frame: FrameEnum) {
        self.input_tx.send(frame, FrameDirection::Downstream).await;
    }

    /// Cancel the pipeline and wait for all processor tasks to finish.
    pub async fn shutdown(mut self) {
        drop(self.input_tx);
        self.cancel_token.cancel();
        while let Some(result) = self.join_set.join_next().await {
            if let Err(e) = result {
                tracing::error!("pipeline: processor task failed during shutdown: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::frames::{
        EndFrame, LLMResponseEndFrame, LLMResponseStartFrame, StartFrame, TextFrame,
    };

    /// Forwards every frame unchanged.
    struct Passthrough {
        name: &'static str,
        id: u64,
    }

    impl Passthrough {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                id: crate::utils::obj_id(),
            }
        }
    }

    crate::impl_processor_debug_display!(Passthrough);

    #[async_trait]
    impl Processor for Passthrough {
        fn name(&self) -> &str {
            self.name
        }
        fn id(&self) -> u64 {
            self.id
        }
        async fn process(
            &mut self,
            frame: FrameEnum,
            direction: FrameDirection,
            ctx: &ProcessorContext,
        ) {
            ctx.send(frame, direction);
        }
    }

    /// Echoes text frames upstream as well as downstream.
    struct UpstreamEcho {
        name: &'static str,
        id: u64,
    }

    crate::impl_processor_debug_display!(UpstreamEcho);

    #[async_trait]
    impl Processor for UpstreamEcho {
        fn name(&self) -> &str {
            self.name
        }
        fn id(&self) -> u64 {
            self.id
        }
        async fn process(
            &mut self,
            frame: FrameEnum,
            direction: FrameDirection,
            ctx: &ProcessorContext,
        ) {
            if let FrameEnum::Text(ref t) = frame {
                ctx.send_upstream(FrameEnum::Text(TextFrame::new(format!("echo:{}", t.text))));
            }
            ctx.send(frame, direction);
        }
    }

    /// Panics on the first text frame.
    struct PanicsOnText {
        id: u64,
    }

    impl std::fmt::Debug for PanicsOnText {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "PanicsOnText({})", self.id)
        }
    }

    impl std::fmt::Display for PanicsOnText {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "panics-on-text")
        }
    }

    #[async_trait]
    impl Processor for PanicsOnText {
        fn name(&self) -> &str {
            "panics-on-text"
        }
        fn id(&self) -> u64 {
            self.id
        }
        async fn process(
            &mut self,
            frame: FrameEnum,
            direction: FrameDirection,
            ctx: &ProcessorContext,
        ) {
            if matches!(frame, FrameEnum::Text(_)) {
                panic!("boom");
            }
            ctx.send(frame, direction);
        }
    }

    #[tokio::test]
    async fn empty_pipeline_passes_frames_through() {
        let mut pipeline = ChannelPipeline::new(vec![]);
        let mut output = pipeline.take_output().expect("output");

        pipeline.send(FrameEnum::Text(TextFrame::new("direct"))).await;
        let out = output.recv().await.expect("frame");
        match out.frame {
            FrameEnum::Text(t) => assert_eq!(t.text, "direct"),
            other => panic!("unexpected {}", other),
        }
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn frames_flow_through_chain() {
        let mut pipeline = ChannelPipeline::new(vec![
            Box::new(Passthrough::new("a")),
            Box::new(Passthrough::new("b")),
            Box::new(Passthrough::new("c")),
        ]);
        let mut output = pipeline.take_output().expect("output");

        pipeline.send(FrameEnum::Start(StartFrame::default())).await;
        pipeline.send(FrameEnum::Text(TextFrame::new("hello"))).await;

        // System frame first (priority), then the data frame.
        let first = output.recv().await.expect("start");
        assert!(matches!(first.frame, FrameEnum::Start(_)));
        let second = output.recv().await.expect("text");
        match second.frame {
            FrameEnum::Text(t) => assert_eq!(t.text, "hello"),
            other => panic!("unexpected {}", other),
        }
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn control_frames_do_not_overtake_data() {
        let mut pipeline = ChannelPipeline::new(vec![Box::new(Passthrough::new("p"))]);
        let mut output = pipeline.take_output().expect("output");

        pipeline
            .send(FrameEnum::LLMResponseStart(LLMResponseStartFrame::new()))
            .await;
        pipeline.send(FrameEnum::Text(TextFrame::new("tok1"))).await;
        pipeline.send(FrameEnum::Text(TextFrame::new("tok2"))).await;
        pipeline
            .send(FrameEnum::LLMResponseEnd(LLMResponseEndFrame::new()))
            .await;

        let names: Vec<&'static str> = [
            output.recv().await.expect("1").frame.name(),
            output.recv().await.expect("2").frame.name(),
            output.recv().await.expect("3").frame.name(),
            output.recv().await.expect("4").frame.name(),
        ]
        .into();
        assert_eq!(
            names,
            vec![
                "LLMResponseStartFrame",
                "TextFrame",
                "TextFrame",
                "LLMResponseEndFrame"
            ]
        );
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn upstream_frames_surface_on_upstream_receiver() {
        let mut pipeline = ChannelPipeline::new(vec![
            Box::new(UpstreamEcho {
                name: "echo",
                id: crate::utils::obj_id(),
            }),
            Box::new(Passthrough::new("after")),
        ]);
        let mut output = pipeline.take_output().expect("output");
        let mut upstream = pipeline.take_upstream().expect("upstream");

        pipeline.send(FrameEnum::Text(TextFrame::new("hi"))).await;

        let up = upstream.recv().await.expect("upstream frame");
        match up.frame {
            FrameEnum::Text(t) => assert_eq!(t.text, "echo:hi"),
            other => panic!("unexpected {}", other),
        }
        let down = output.recv().await.expect("downstream frame");
        assert!(matches!(down.frame, FrameEnum::Text(_)));
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn panic_becomes_fatal_error_frame() {
        let mut pipeline = ChannelPipeline::new(vec![
            Box::new(PanicsOnText {
                id: crate::utils::obj_id(),
            }),
            Box::new(Passthrough::new("after")),
        ]);
        let mut output = pipeline.take_output().expect("output");

        pipeline.send(FrameEnum::Text(TextFrame::new("trigger"))).await;

        let out = output.recv().await.expect("error frame");
        match out.frame {
            FrameEnum::Error(e) => {
                assert!(e.fatal);
                assert!(e.error.contains("panics-on-text"));
            }
            other => panic!("unexpected {}", other),
        }
        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_joins_all_tasks() {
        let pipeline = ChannelPipeline::new(vec![
            Box::new(Passthrough::new("a")),
            Box::new(Passthrough::new("b")),
        ]);
        pipeline.send(FrameEnum::End(EndFrame::new())).await;
        // Must return promptly without hanging.
        pipeline.shutdown().await;
    }
}
