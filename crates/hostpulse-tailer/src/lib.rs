// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Multi-file log tailer.
//!
//! ```text
//!   file A ──watcher──┐
//!   file B ──watcher──┼──mpsc──> LineBatcher ──flush──> LineSink
//!   file C ──watcher──┘            (owns batch)
//! ```
//!
//! Each watcher follows one file, surviving rotation and truncation, and
//! forwards complete lines over a channel. The batcher is the only owner of
//! the batch: it flushes when `buffer_count` lines are buffered or when the
//! flush timer ticks with a non-empty batch. Across files the interleaving is
//! arbitrary; within one file line order is preserved.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batcher;
pub mod error;
pub mod tailer;
pub mod watcher;

pub use batcher::{BatcherHandle, LineBatcher, LineSink};
pub use error::{TailerError, WatchError};
pub use tailer::{Tailer, TailerConfig, TailerState};
pub use watcher::{FileWatcher, StartPosition};
