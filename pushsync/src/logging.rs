//! Tracing setup with a reloadable filter.
//!
//! Console output always; an optional daily-rotated file sink. The
//! [`EventLog`](crate::event_log::EventLog) mirrors its entries into tracing,
//! so whatever is configured here also receives the engine's event trail.

use std::path::PathBuf;

use chrono::Local;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

use crate::error::{Error, Result};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "pushsync=info";

const LOG_FILE_PREFIX: &str = "pushsync.log";

/// Timestamps in the local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Filter directive; falls back to `RUST_LOG`, then [`DEFAULT_LOG_FILTER`].
    pub filter: Option<String>,
    /// Directory for daily-rotated log files. Console only when unset.
    pub log_dir: Option<PathBuf>,
    /// Emit JSON lines on the console instead of the human format.
    pub json: bool,
}

impl LoggingOptions {
    fn initial_filter(&self) -> Result<EnvFilter> {
        match self.filter.as_deref() {
            Some(directive) => parse_filter(directive),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))),
        }
    }
}

/// Live handle on the installed subscriber.
pub struct LoggingHandle {
    handle: FilterHandle,
}

impl LoggingHandle {
    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Swap the filter directive, e.g. `"pushsync::push=debug"`.
    pub fn set_filter(&self, directive: &str) -> Result<()> {
        let new_filter = parse_filter(directive)?;
        self.handle
            .reload(new_filter)
            .map_err(|e| Error::Other(format!("Failed to reload filter: {e}")))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }
}

fn parse_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| Error::config(format!("Invalid filter directive: {e}")))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for as long as file output is wanted.
pub fn init_logging(options: &LoggingOptions) -> Result<(LoggingHandle, Option<WorkerGuard>)> {
    let (filter_layer, filter_handle) = reload::Layer::new(options.initial_filter()?);

    let console = if options.json {
        fmt::layer().json().with_timer(LocalTimer).boxed()
    } else {
        fmt::layer().with_ansi(true).with_timer(LocalTimer).boxed()
    };

    let (file, guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::config(format!("Cannot create log directory {}: {e}", dir.display()))
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to set global default subscriber: {e}")))?;

    let handle = LoggingHandle {
        handle: filter_handle,
    };
    Ok((handle, guard))
}
