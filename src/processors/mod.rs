// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! Frame processing infrastructure.
//!
//! Processors are the pipeline's building blocks: each one receives frames,
//! reacts to them, and emits output frames through its [`ProcessorContext`].
//! The pipeline runs every processor on its own tokio task (see
//! [`crate::pipeline`]).

pub mod aggregators;
pub mod processor;
pub mod vad;

pub use processor::{Processor, ProcessorContext, ProcessorWeight};

/// The direction a frame is travelling through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameDirection {
    /// Toward the output (transport) end of the pipeline.
    Downstream,
    /// Toward the input end of the pipeline.
    Upstream,
}

/// Implement `Debug` and `Display` for a processor type with `name` and `id`
/// fields. `Debug` prints `TypeName(name#id)`, `Display` just the name.
#[macro_export]
macro_rules! impl_processor_debug_display {
    ($struct_name:ident) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({}#{})", stringify!($struct_name), self.name, self.id)
            }
        }

        impl std::fmt::Display for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.name)
            }
        }
    };
}
