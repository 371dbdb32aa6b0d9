// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::tailer::TailerState;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TailerError {
    #[error("tailer cannot start from state {0:?}")]
    InvalidState(TailerState),

    #[error("no readable log files")]
    NoFiles,
}

/// Failures while following a single file.
///
/// `Open` ends that file's task; `Read` is logged and the task keeps going.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl WatchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatchError::Open { .. })
    }
}
