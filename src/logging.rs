use std::path::Path;

use anyhow::Context;
use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Target shared by every event this crate emits.
pub const LOG_TARGET: &str = "conversion_reporter";

pub const LOG_FILTER_ENV: &str = "CONVERSION_REPORTER_LOG";
pub const LOG_MAX_SIZE_ENV: &str = "CONVERSION_REPORTER_LOG_MAX_SIZE_BYTES";
pub const LOG_MAX_FILES_ENV: &str = "CONVERSION_REPORTER_LOG_MAX_FILES";

const DEFAULT_FILTER: &str = "conversion_reporter=info,sqlx=warn";
const DEFAULT_MAX_SIZE_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_MAX_FILES: usize = 5;
const LOG_FILE_NAME: &str = "conversion-reporter.log";

/// Size and retention limits for the rotating file sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationLimits {
    pub max_size_bytes: usize,
    pub max_files: usize,
}

impl RotationLimits {
    pub fn from_env() -> Self {
        Self {
            max_size_bytes: env_usize(LOG_MAX_SIZE_ENV).unwrap_or(DEFAULT_MAX_SIZE_BYTES),
            max_files: env_usize(LOG_MAX_FILES_ENV).unwrap_or(DEFAULT_MAX_FILES),
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
}

/// Install the global subscriber: JSON lines on stdout, plus a size-rotated
/// file under `log_dir` when one is configured.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub fn init(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stdout_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let writer = rotating_writer(dir, RotationLimits::from_env())?;
            let (non_blocking, guard) = tracing_appender::non_blocking(writer);
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_ansi(false)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("install global tracing subscriber")?;

    if let Some(dir) = log_dir {
        tracing::info!(target: LOG_TARGET, event = "file_logging_enabled", dir = %dir.display());
    }

    Ok(guard)
}

/// Open the rotating log file, creating `dir` if needed.
pub fn rotating_writer(dir: &Path, limits: RotationLimits) -> anyhow::Result<FileRotate<AppendCount>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create log directory {}", dir.display()))?;
    Ok(FileRotate::new(
        dir.join(LOG_FILE_NAME),
        AppendCount::new(limits.max_files),
        ContentLimit::Bytes(limits.max_size_bytes),
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rotating_writer_rolls_over_at_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let limits = RotationLimits {
            max_size_bytes: 64,
            max_files: 2,
        };
        let mut writer = rotating_writer(dir.path(), limits).unwrap();
        for idx in 0..20 {
            writeln!(writer, "{{\"event\":\"line\",\"index\":{idx}}}").unwrap();
        }
        writer.flush().unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert!(names.contains(&LOG_FILE_NAME.to_string()), "{names:?}");
        assert!(names.len() <= 3, "retention cap exceeded: {names:?}");
        assert!(names.iter().any(|name| name.ends_with(".1")), "{names:?}");
    }
}
