use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub mod config;
pub mod cycle;
pub mod db;
pub mod error;
pub mod identifier;
pub mod logging;
pub mod looper;
pub mod mailer;
pub mod report;
pub mod scan;
pub mod signal;
pub mod store;

pub use error::{AppError, AppResult};

use cycle::{CycleConfig, ReportCycle};
use looper::LoopExit;
use mailer::Mailer;
use store::ItemStore;

/// Drive report cycles against `store` and `mailer` until the control file,
/// or a shutdown request, ends the loop.
pub async fn run_reporter<S, M>(
    config: &CycleConfig,
    store: &S,
    mailer: &M,
    control: Option<&Path>,
    interval: Duration,
    shutdown: CancellationToken,
) -> LoopExit
where
    S: ItemStore + ?Sized,
    M: Mailer + ?Sized,
{
    looper::run_loop(control, interval, shutdown, move || async move {
        let outcome = ReportCycle::new(config, store, mailer).run().await;
        tracing::debug!(target: logging::LOG_TARGET, event = "cycle_complete", outcome = ?outcome);
    })
    .await
}
