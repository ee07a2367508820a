//! src/logging.rs
//!
//! Tracing setup: a daily rolling log file (non-blocking) plus an optional
//! stderr mirror, both using a compact sequence-numbered line format.

use std::{
    fs,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use anyhow::Context;
use tracing::Metadata;
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, daily},
};
use tracing_subscriber::{
    EnvFilter,
    fmt::{
        self, FmtContext,
        format::{FormatEvent, FormatFields, Writer},
    },
    layer::SubscriberExt,
    prelude::*,
};

use crate::config::LoggingConfig;

pub struct Logger;

impl Logger {
    /// Call **once** near the start of `main`. Keep the returned guard alive
    /// for the whole run; dropping it flushes the file writer.
    pub fn init_tracing(config: &LoggingConfig, log_dir: &Path) -> anyhow::Result<WorkerGuard> {
        // create the log dir if missing
        fs::create_dir_all(log_dir)
            .with_context(|| format!("cannot create log dir {}", log_dir.display()))?;

        // daily rolling file appender → <log_dir>/capdir.log.YYYY-MM-DD
        let file: RollingFileAppender = daily(log_dir, "capdir.log");
        let (writer, guard): (NonBlocking, WorkerGuard) = tracing_appender::non_blocking(file);

        let file_layer = fmt::layer()
            .event_format(SeqFileMod) // our compact formatter
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(Self::filter(&config.level));

        // optional stderr layer for live debugging
        let stderr_layer = config.stderr.then(|| {
            fmt::layer()
                .event_format(SeqFileMod)
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_filter(Self::filter(&config.level))
        });

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .try_init()
            .context("a global tracing subscriber is already installed")?;

        Ok(guard)
    }

    /// `RUST_LOG` wins over the configured level; a bad level falls back to
    /// `info`.
    fn filter(level: &str) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

static SEQ: AtomicUsize = AtomicUsize::new(1);

/// Custom formatter: `[SEQ] LEVEL [file:line mod::path] message`
struct SeqFileMod;

impl<S, N> FormatEvent<S, N> for SeqFileMod
where
    S: tracing::Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut w: Writer<'_>,
        ev: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        // monotonically‑increasing sequence number
        let seq: usize = SEQ.fetch_add(1, Ordering::Relaxed);

        let meta: &'static Metadata<'static> = ev.metadata();
        write!(
            w,
            "{seq:06} {:5} [{}:{} {}] ",
            meta.level(),
            meta.file().unwrap_or("??"),
            meta.line().unwrap_or(0),
            meta.module_path().unwrap_or("???"),
        )?;

        // write all key‑value pairs for this event
        ctx.field_format().format_fields(w.by_ref(), ev)?;
        writeln!(w)
    }
}
