// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to run {command}: {source}")]
    Command {
        command: String,
        source: std::io::Error,
    },

    #[error("unexpected data: {0}")]
    Parse(String),

    #[error("{0} is not available on this platform")]
    Unsupported(&'static str),

    #[error("no data: {0}")]
    Empty(&'static str),
}
