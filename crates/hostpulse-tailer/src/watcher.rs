// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::batcher::BatcherHandle;
use crate::error::WatchError;
use std::fs::Metadata;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where a freshly opened file is first read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    Beginning,
    End,
}

/// Polling state machine following a single path.
///
/// The watcher remembers the identity of the file it has open. When a read
/// hits end of file it checks the path again: a different identity (rename
/// rotation) or a length shorter than what has been read (truncation) makes
/// it reopen the path from the beginning. A path that does not exist yet is
/// retried on every poll and read from the beginning once it shows up.
pub struct FileWatcher {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    file_id: Option<(u64, u64)>,
    offset: u64,
    partial: Vec<u8>,
    reopen: bool,
}

impl FileWatcher {
    pub async fn open(path: PathBuf, position: StartPosition) -> Result<Self, WatchError> {
        let mut watcher = FileWatcher {
            path,
            reader: None,
            file_id: None,
            offset: 0,
            partial: Vec::new(),
            reopen: false,
        };
        watcher.open_at_start().await?;
        if position == StartPosition::End {
            if let Some(reader) = watcher.reader.as_mut() {
                watcher.offset = reader
                    .seek(SeekFrom::End(0))
                    .await
                    .map_err(|source| WatchError::Open {
                        path: watcher.path.clone(),
                        source,
                    })?;
            }
        }
        Ok(watcher)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    async fn open_at_start(&mut self) -> Result<(), WatchError> {
        self.partial.clear();
        self.offset = 0;
        self.reopen = false;
        match File::open(&self.path).await {
            Ok(file) => {
                let metadata = file.metadata().await.map_err(|source| WatchError::Open {
                    path: self.path.clone(),
                    source,
                })?;
                self.file_id = file_id(&metadata);
                self.reader = Some(BufReader::new(file));
                debug!("Opened {} from the start", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.reader = None;
                self.file_id = None;
                Ok(())
            }
            Err(source) => Err(WatchError::Open {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// True when the path now names a different file or the open file shrank.
    ///
    /// A missing path is not a rotation: the old handle keeps being drained
    /// until a new file appears.
    async fn rotated(&self) -> bool {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => {
                let current = file_id(&metadata);
                (current.is_some() && current != self.file_id) || metadata.len() < self.offset
            }
            Err(_) => false,
        }
    }

    /// Reads the next complete line, without its terminator.
    ///
    /// `Ok(None)` means nothing new is available right now. Bytes after the
    /// last newline are held back until the line is completed.
    pub async fn next_line(&mut self) -> Result<Option<String>, WatchError> {
        if self.reader.is_none() {
            self.open_at_start().await?;
            if self.reader.is_none() {
                return Ok(None);
            }
        }
        if self.reopen {
            if self.rotated().await {
                info!("Detected rotation of {}, reopening", self.path.display());
                self.open_at_start().await?;
                if self.reader.is_none() {
                    return Ok(None);
                }
            }
            self.reopen = false;
        }

        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        match reader.read_until(b'\n', &mut self.partial).await {
            Ok(0) => {
                self.reopen = true;
                Ok(None)
            }
            Ok(read) => {
                self.offset += read as u64;
                if self.partial.last() != Some(&b'\n') {
                    self.reopen = true;
                    return Ok(None);
                }
                self.partial.pop();
                if self.partial.last() == Some(&b'\r') {
                    self.partial.pop();
                }
                let line = String::from_utf8_lossy(&self.partial).into_owned();
                self.partial.clear();
                Ok(Some(line))
            }
            Err(source) => {
                self.reopen = true;
                Err(WatchError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        }
    }
}

#[cfg(unix)]
fn file_id(metadata: &Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
fn file_id(_metadata: &Metadata) -> Option<(u64, u64)> {
    None
}

/// Drives one watcher until cancelled, forwarding every line to the batcher.
pub(crate) async fn follow(
    mut watcher: FileWatcher,
    lines: BatcherHandle,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    debug!("Tailing {}", watcher.path().display());
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match watcher.next_line().await {
            Ok(Some(line)) => {
                tokio::select! {
                    sent = lines.push(line) => {
                        if sent.is_err() {
                            debug!("Line channel closed, stop tailing {}", watcher.path().display());
                            return;
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = cancel.cancelled() => break,
                }
            }
            Err(e) if e.is_fatal() => {
                error!("Giving up on log file: {e}");
                return;
            }
            Err(e) => {
                warn!("{e}");
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }
    }
    debug!("Stopped tailing {}", watcher.path().display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn append(path: &Path, data: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("open for append");
        file.write_all(data.as_bytes()).expect("append");
    }

    async fn drain(watcher: &mut FileWatcher) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = watcher.next_line().await.expect("read") {
            out.push(line);
        }
        out
    }

    #[tokio::test]
    async fn starts_at_end_by_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.log");
        append(&path, "old line\n");

        let mut watcher = FileWatcher::open(path.clone(), StartPosition::End)
            .await
            .expect("open");
        assert!(drain(&mut watcher).await.is_empty());

        append(&path, "new line\n");
        assert_eq!(drain(&mut watcher).await, vec!["new line"]);
    }

    #[tokio::test]
    async fn reads_existing_content_from_beginning() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.log");
        append(&path, "one\ntwo\n");

        let mut watcher = FileWatcher::open(path, StartPosition::Beginning)
            .await
            .expect("open");
        assert_eq!(drain(&mut watcher).await, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn holds_partial_line_until_newline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.log");
        append(&path, "");

        let mut watcher = FileWatcher::open(path.clone(), StartPosition::End)
            .await
            .expect("open");
        append(&path, "hal");
        assert!(drain(&mut watcher).await.is_empty());
        append(&path, "f done\r\n");
        assert_eq!(drain(&mut watcher).await, vec!["half done"]);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.log");
        std::fs::write(&path, b"ok \xff\xfe bytes\n").expect("write");

        let mut watcher = FileWatcher::open(path, StartPosition::Beginning)
            .await
            .expect("open");
        assert_eq!(drain(&mut watcher).await, vec!["ok \u{fffd}\u{fffd} bytes"]);
    }

    #[tokio::test]
    async fn missing_file_is_picked_up_when_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("later.log");

        let mut watcher = FileWatcher::open(path.clone(), StartPosition::End)
            .await
            .expect("missing file is not an error");
        assert!(!watcher.is_open());
        assert!(drain(&mut watcher).await.is_empty());

        append(&path, "first\n");
        assert_eq!(drain(&mut watcher).await, vec!["first"]);
        assert!(watcher.is_open());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn follows_rename_rotation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.log");
        append(&path, "");

        let mut watcher = FileWatcher::open(path.clone(), StartPosition::End)
            .await
            .expect("open");
        append(&path, "before\n");
        assert_eq!(drain(&mut watcher).await, vec!["before"]);

        std::fs::rename(&path, dir.path().join("app.log.1")).expect("rename");
        append(&path, "after\n");
        assert_eq!(drain(&mut watcher).await, vec!["after"]);
    }

    #[tokio::test]
    async fn follows_truncation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.log");
        append(&path, "");

        let mut watcher = FileWatcher::open(path.clone(), StartPosition::End)
            .await
            .expect("open");
        append(&path, "a fairly long line before truncation\n");
        assert_eq!(drain(&mut watcher).await.len(), 1);

        std::fs::write(&path, "short\n").expect("truncate and write");
        assert_eq!(drain(&mut watcher).await, vec!["short"]);
    }
}
