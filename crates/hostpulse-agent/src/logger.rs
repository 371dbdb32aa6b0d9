// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log output for the agent.
//!
//! Every line is prefixed so agent output is easy to pick out of a shared
//! journal:
//!
//! ```text
//! HOSTPULSE | 2024-06-10 08:13:20 | INFO | Config loaded from config.yaml
//! HOSTPULSE | 2024-06-10 08:13:30 | ERROR | Send failed: 1718007210: non-2xx response: 503 Service Unavailable
//! ```
//!
//! With a log directory configured, the same lines are also appended to
//! `<dir>/hostpulse_<YYYY-MM-DD>.log`.

use crate::error::AgentError;
use chrono::NaiveDate;
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::format::{self, FormatEvent, FormatFields};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::{FmtContext, FormattedFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

const PREFIX: &str = "HOSTPULSE";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Transport internals are only interesting when debugging them directly.
const QUIET_TARGETS: &str = "h2=off,hyper=off,hyper_util=off,rustls=off,reqwest=warn";

/// `HOSTPULSE | local time | LEVEL | [span{fields}: ]message fields`
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            &mut writer,
            "{PREFIX} | {} | {} | ",
            chrono::Local::now().format(TIME_FORMAT),
            event.metadata().level()
        )?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

pub fn log_file_name(date: NaiveDate) -> String {
    format!("hostpulse_{}.log", date.format("%Y-%m-%d"))
}

/// Directives for `level`; `RUST_LOG` takes precedence when set.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(format!("{QUIET_TARGETS},{}", level.to_lowercase()))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

fn open_log_file(dir: &Path) -> std::io::Result<(PathBuf, std::fs::File)> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(log_file_name(chrono::Local::now().date_naive()));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

fn subscriber(level: &str, writer: BoxMakeWriter) -> impl Subscriber + Send + Sync {
    tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(level))
        .event_format(Formatter)
        .with_writer(writer)
        .finish()
}

/// A stdout-only subscriber at `info`, for the moments before the
/// configuration that drives [`init`] has been read.
pub fn bootstrap() -> impl Subscriber + Send + Sync {
    subscriber("info", BoxMakeWriter::new(std::io::stdout))
}

/// Installs the global subscriber. Call once, before anything logs.
pub fn init(level: &str, log_dir: Option<&Path>) -> Result<(), AgentError> {
    let (writer, log_path) = match log_dir {
        Some(dir) => {
            let (path, file) = open_log_file(dir).map_err(|e| {
                AgentError::Logging(format!("cannot open log file in {}: {e}", dir.display()))
            })?;
            (
                BoxMakeWriter::new(std::io::stdout.and(Mutex::new(file))),
                Some(path),
            )
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    tracing::subscriber::set_global_default(subscriber(level, writer))
        .map_err(|e| AgentError::Logging(e.to_string()))?;

    if let Some(path) = log_path {
        tracing::debug!("Also logging to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn lines_carry_prefix_and_level() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            // `tracing-test` (dev-dependency) unifies in the `ansi` feature;
            // match the non-ANSI production build.
            .with_ansi(false)
            .event_format(Formatter)
            .with_writer(capture.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(queued = 3, "Retry failed");
            let span = tracing::info_span!("heartbeat", agent = "a1");
            let _guard = span.enter();
            tracing::info!("sent");
        });

        let output = String::from_utf8(capture.0.lock().expect("lock").clone()).expect("utf8");
        let lines: Vec<Vec<&str>> = output
            .lines()
            .map(|line| line.splitn(3, " | ").collect())
            .collect();
        assert_eq!(lines.len(), 2);
        for parts in &lines {
            assert_eq!(parts[0], "HOSTPULSE");
            assert!(
                chrono::NaiveDateTime::parse_from_str(parts[1], TIME_FORMAT).is_ok(),
                "bad timestamp: {}",
                parts[1]
            );
        }
        assert_eq!(lines[0][2], "WARN | Retry failed queued=3");
        assert_eq!(lines[1][2], "INFO | heartbeat{agent=\"a1\"}: sent");
    }

    #[test]
    fn daily_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).expect("valid date");
        assert_eq!(log_file_name(date), "hostpulse_2024-03-09.log");
    }

    #[test]
    fn log_file_is_created_in_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("logs");
        let (path, _file) = open_log_file(&nested).expect("open");
        assert!(path.starts_with(&nested));
        assert!(path.exists());
    }
}
