use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::identifier::{self, IdentifierError};
use crate::logging::LOG_TARGET;
use crate::mailer::{subject_line, Mailer};
use crate::report::{EmailReport, PendingItem};
use crate::scan::{scan_error_dir, ErrorItem};
use crate::store::{report_state, ItemStore, ReportState};
use crate::AppError;

/// The parts of [`Settings`] one cycle needs.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub error_dir: PathBuf,
    pub folder_prefix: String,
    pub subject_prefix: String,
}

impl From<&Settings> for CycleConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            error_dir: settings.error_dir_path.clone(),
            folder_prefix: settings.folder_prefix.clone(),
            subject_prefix: settings.subject_prefix.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub files_found: usize,
    pub folders_found: usize,
    pub reported_files: usize,
    pub reported_folders: usize,
    /// Items whose failure was reported but whose row update failed.
    pub update_failures: usize,
    pub mail_sent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The error directory could not be listed.
    ScanFailed(AppError),
    /// Nothing in the error directory.
    Empty,
    /// Items present, all already on record or skipped.
    NothingNew(CycleSummary),
    /// New failures recorded and emailed (or the send was attempted).
    Reported(CycleSummary),
}

/// The failure text stored on the item row.
pub fn failure_message(item: &ErrorItem) -> String {
    format!("Failed to convert: ({})", item.path.display())
}

/// One pass over the error directory.
pub struct ReportCycle<'a, S: ?Sized, M: ?Sized> {
    config: &'a CycleConfig,
    store: &'a S,
    mailer: &'a M,
}

impl<'a, S, M> ReportCycle<'a, S, M>
where
    S: ItemStore + ?Sized,
    M: Mailer + ?Sized,
{
    pub fn new(config: &'a CycleConfig, store: &'a S, mailer: &'a M) -> Self {
        Self {
            config,
            store,
            mailer,
        }
    }

    pub async fn run(&self) -> CycleOutcome {
        let scan = match scan_error_dir(&self.config.error_dir) {
            Ok(scan) => scan,
            Err(err) => {
                let err = AppError::from(err);
                err.log_with_event("error_dir_unreadable");
                return CycleOutcome::ScanFailed(err);
            }
        };
        if scan.is_empty() {
            debug!(target: LOG_TARGET, event = "error_dir_empty", dir = %self.config.error_dir.display());
            return CycleOutcome::Empty;
        }

        let mut summary = CycleSummary {
            files_found: scan.files.len(),
            folders_found: scan.folders.len(),
            ..CycleSummary::default()
        };

        let files = self.record_new_failures(&scan.files, &mut summary).await;
        let folders = self.record_new_failures(&scan.folders, &mut summary).await;
        summary.reported_files = files.len();
        summary.reported_folders = folders.len();

        if files.is_empty() && folders.is_empty() {
            debug!(
                target: LOG_TARGET,
                event = "nothing_new",
                files = summary.files_found,
                folders = summary.folders_found
            );
            return CycleOutcome::NothingNew(summary);
        }

        info!(
            target: LOG_TARGET,
            event = "errors_found",
            files = summary.files_found,
            folders = summary.folders_found,
            new_files = summary.reported_files,
            new_folders = summary.reported_folders,
            "{} file(s) and {} folder(s) found in the error folder.",
            summary.files_found,
            summary.folders_found
        );

        let report = EmailReport::collect(self.store, &files, &folders).await;
        let subject = subject_line(&self.config.subject_prefix, Local::now());
        match self.mailer.send(&subject, &report.render()).await {
            Ok(()) => {
                summary.mail_sent = true;
                info!(target: LOG_TARGET, event = "report_sent", subject = %subject);
            }
            Err(err) => err.log_with_event("report_send_failed"),
        }

        CycleOutcome::Reported(summary)
    }

    /// Check each item, mark the unreported ones failed and return them in
    /// scan order.
    async fn record_new_failures(
        &self,
        items: &[ErrorItem],
        summary: &mut CycleSummary,
    ) -> Vec<PendingItem> {
        let mut pending = Vec::new();
        for item in items {
            let id = match identifier::resolve(item, &self.config.folder_prefix) {
                Ok(id) => id,
                Err(err) => {
                    log_invalid_identifier(&item.path, &err);
                    continue;
                }
            };

            let state = report_state(self.store, &id).await;
            if !state.should_report() {
                log_suppressed(item, &id.to_string(), &state);
                continue;
            }

            let message = failure_message(item);
            match self.store.mark_failed(&id, &message).await {
                Ok(0) => warn!(
                    target: LOG_TARGET,
                    event = "mark_failed_no_rows",
                    id = %id,
                    path = %item.path.display()
                ),
                Ok(_) => info!(
                    target: LOG_TARGET,
                    event = "marked_failed",
                    kind = item.kind.as_str(),
                    id = %id,
                    path = %item.path.display()
                ),
                Err(err) => {
                    summary.update_failures += 1;
                    err.with_context("path", item.path.display().to_string())
                        .log_with_event("mark_failed_error");
                }
            }
            pending.push(PendingItem {
                item: item.clone(),
                id,
            });
        }
        pending
    }
}

fn log_invalid_identifier(path: &Path, err: &IdentifierError) {
    warn!(
        target: LOG_TARGET,
        event = "invalid_identifier",
        path = %path.display(),
        error = %err
    );
}

fn log_suppressed(item: &ErrorItem, id: &str, state: &ReportState) {
    match state {
        ReportState::Unreported => {}
        ReportState::Reported => debug!(
            target: LOG_TARGET,
            event = "already_reported",
            id,
            path = %item.path.display()
        ),
        ReportState::Missing => warn!(
            target: LOG_TARGET,
            event = "item_row_missing",
            id,
            path = %item.path.display()
        ),
        ReportState::Unavailable(err) => error!(
            target: LOG_TARGET,
            event = "report_state_unavailable",
            id,
            path = %item.path.display(),
            error = %err
        ),
    }
}
