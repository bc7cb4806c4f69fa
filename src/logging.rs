//! Durable install log and stderr diagnostics.
//!
//! The install log gets one `<timestamp> - <LEVEL> - <message>` line per event. Every
//! line passes through the [`SecretRegistry`] before it reaches the file.

use std::{
    fmt,
    fs::OpenOptions,
    io::{self, Write},
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{Context as _, Result};
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    fmt::{
        format::Writer,
        time::{FormatTime, SystemTime},
        FmtContext, FormatEvent, FormatFields, MakeWriter,
    },
    layer::SubscriberExt as _,
    registry::LookupSpan,
    util::SubscriberInitExt as _,
    EnvFilter, Layer as _,
};

use crate::store::SecretRegistry;

pub const DEFAULT_LOG_FILE: &str = "install.log";

/// `2025-01-01T10:00:00.000000Z - INFO - Command executed successfully: ...`
pub struct LogLine;

impl<S, N> FormatEvent<S, N> for LogLine
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        SystemTime.format_time(&mut writer)?;
        write!(writer, " - {} - ", event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Hands out one buffer per event and writes it, scrubbed, to the shared sink on drop.
pub struct ScrubbingWriter<W> {
    sink: Arc<Mutex<W>>,
    registry: SecretRegistry,
}

impl<W> Clone for ScrubbingWriter<W> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<W: Write> ScrubbingWriter<W> {
    pub fn new(sink: W, registry: SecretRegistry) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            registry,
        }
    }
}

impl<'a, W: Write + 'a> MakeWriter<'a> for ScrubbingWriter<W> {
    type Writer = ScrubbedEvent<'a, W>;

    fn make_writer(&'a self) -> Self::Writer {
        ScrubbedEvent {
            buffer: Vec::new(),
            writer: self,
        }
    }
}

pub struct ScrubbedEvent<'a, W: Write> {
    buffer: Vec<u8>,
    writer: &'a ScrubbingWriter<W>,
}

impl<W: Write> Write for ScrubbedEvent<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: Write> Drop for ScrubbedEvent<'_, W> {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.buffer);
        let text = self.writer.registry.scrub(&text);
        let mut sink = self.writer.sink.lock().unwrap_or_else(|e| e.into_inner());
        // Nowhere left to report a failing log sink.
        let _ = sink.write_all(text.as_bytes()).and_then(|()| sink.flush());
    }
}

/// Install the global subscriber.
///
/// With `log_file` set, events go to that file (appended) at INFO, or DEBUG with
/// `debug`. Warnings and errors always go to stderr. `RUST_LOG` overrides both levels.
pub fn init(log_file: Option<&Path>, debug: bool, registry: SecretRegistry) -> Result<()> {
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_filter(stderr_filter);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {path:?}"))?;
            let default_level = if debug { "debug" } else { "info" };
            let file_filter =
                EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .event_format(LogLine)
                    .with_writer(ScrubbingWriter::new(file, registry))
                    .with_filter(file_filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}
