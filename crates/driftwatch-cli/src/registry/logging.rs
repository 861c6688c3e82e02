use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

use super::{RegistryError, RegistryResult};
use crate::settings::{LogFormat, LoggingSettings};

/// Install the global subscriber: stderr in the configured format, plus a
/// JSON copy of every event in the run's `logs.ndjson` when given.
pub fn init_logging(settings: &LoggingSettings, run_log: Option<&Path>) -> RegistryResult<()> {
    let filter = EnvFilter::try_new(&settings.level)
        .map_err(|err| RegistryError::Logging(format!("invalid log level: {err}")))?;

    let stderr_json = (settings.format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(io::stderr)
    });
    let stderr_text = (settings.format == LogFormat::Text).then(|| {
        tracing_subscriber::fmt::layer()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(io::stderr)
    });
    let run_layer = run_log.map(run_log_layer).transpose()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_json)
        .with(stderr_text)
        .with(run_layer)
        .try_init()
        .map_err(|err| RegistryError::Logging(err.to_string()))?;

    Ok(())
}

/// JSON lines appended to the run log; the file handle is shared by every
/// event through its mutex.
fn run_log_layer<S>(path: &Path) -> RegistryResult<Box<dyn Layer<S> + Send + Sync>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(tracing_subscriber::fmt::layer()
        .json()
        .with_ansi(false)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(Mutex::new(file))
        .boxed())
}
