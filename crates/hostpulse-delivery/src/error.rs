// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;
use std::path::PathBuf;

/// A failed delivery attempt.
///
/// Callers only act on success versus failure; the variants exist so the
/// cause shows up in logs.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to build request: {0}")]
    Request(String),

    #[error("post request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("non-2xx response: {0}")]
    Status(StatusCode),
}

/// Writing the retry backup file failed.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("failed to create backup directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode backup: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write backup file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
