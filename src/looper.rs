//! Repeat driver: one unconditional cycle, then more while the control file
//! says `true`.

use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::logging::LOG_TARGET;
use crate::AppError;

/// What the control file asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    Continue,
    Stop,
    /// The file does not exist. Treated as a stop.
    Absent,
}

/// How the loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// No control file configured; a single cycle ran.
    RanOnce,
    /// The control file asked to stop (or was removed).
    Stopped,
    /// Shutdown was requested through the cancellation token.
    Cancelled,
    /// The control file exists but could not be read.
    ControlFileUnreadable(AppError),
}

impl LoopExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            LoopExit::ControlFileUnreadable(_) => 2,
            _ => 0,
        }
    }
}

/// `true` in any case, surrounded by any whitespace, continues.
pub fn parse_control(text: &str) -> ControlSignal {
    if text.trim().eq_ignore_ascii_case("true") {
        ControlSignal::Continue
    } else {
        ControlSignal::Stop
    }
}

pub fn read_control_file(path: &Path) -> Result<ControlSignal, AppError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(parse_control(&text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(ControlSignal::Absent),
        Err(err) => Err(
            AppError::new("CONTROL/UNREADABLE", "Could not read the control file")
                .with_context("path", path.display().to_string())
                .with_cause(err),
        ),
    }
}

/// Run `cycle` once, then keep running it every `interval` for as long as
/// the control file reads `true`. Without a control file only one cycle runs.
///
/// Cancellation is honoured between cycles and during the pause; a cycle
/// that has started always finishes so no row is marked without its email.
pub async fn run_loop<F, Fut>(
    control: Option<&Path>,
    interval: Duration,
    shutdown: CancellationToken,
    mut cycle: F,
) -> LoopExit
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    if shutdown.is_cancelled() {
        info!(target: LOG_TARGET, event = "shutdown_before_first_cycle");
        return LoopExit::Cancelled;
    }
    cycle().await;

    let Some(control) = control else {
        return LoopExit::RanOnce;
    };

    loop {
        match read_control_file(control) {
            Ok(ControlSignal::Continue) => {}
            Ok(ControlSignal::Stop) => {
                info!(target: LOG_TARGET, event = "loop_stopped", control = %control.display());
                return LoopExit::Stopped;
            }
            Ok(ControlSignal::Absent) => {
                warn!(target: LOG_TARGET, event = "control_file_absent", control = %control.display());
                return LoopExit::Stopped;
            }
            Err(err) => {
                err.log_with_event("control_file_unreadable");
                return LoopExit::ControlFileUnreadable(err);
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(target: LOG_TARGET, event = "shutdown_during_wait");
                return LoopExit::Cancelled;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        cycle().await;
    }
}
