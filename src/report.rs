use std::path::PathBuf;

use tracing::debug;

use crate::identifier::ItemId;
use crate::logging::LOG_TARGET;
use crate::scan::ErrorItem;
use crate::store::ItemStore;

const HEADER: &str = "Errors occurred while DC Pro attempted to convert the following";
const CRLF: &str = "\r\n";

/// An item that still needs reporting, with its resolved id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem {
    pub item: ErrorItem,
    pub id: ItemId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub path: PathBuf,
    /// `None` when the message could not be fetched; the suffix is omitted.
    pub error_message: Option<String>,
}

/// Body of one cycle's email, files first then folders, in scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmailReport {
    pub files: Vec<ReportLine>,
    pub folders: Vec<ReportLine>,
}

impl EmailReport {
    /// Build the report, re-reading each row's error message. A failed or
    /// empty lookup only drops that line's message.
    pub async fn collect<S: ItemStore + ?Sized>(
        store: &S,
        files: &[PendingItem],
        folders: &[PendingItem],
    ) -> EmailReport {
        EmailReport {
            files: lines(store, files).await,
            folders: lines(store, folders).await,
        }
    }

    pub fn render(&self) -> String {
        let mut body = String::from(HEADER);
        body.push_str(CRLF);
        render_section(&mut body, "files:", &self.files);
        render_section(&mut body, "folders:", &self.folders);
        body
    }
}

async fn lines<S: ItemStore + ?Sized>(store: &S, pending: &[PendingItem]) -> Vec<ReportLine> {
    let mut lines = Vec::with_capacity(pending.len());
    for entry in pending {
        let error_message = match store.fetch(&entry.id).await {
            Ok(Some(row)) => Some(row.error_message.unwrap_or_default()),
            Ok(None) => None,
            Err(err) => {
                debug!(
                    target: LOG_TARGET,
                    event = "report_message_unavailable",
                    id = %entry.id,
                    error = %err
                );
                None
            }
        };
        lines.push(ReportLine {
            path: entry.item.path.clone(),
            error_message,
        });
    }
    lines
}

fn render_section(body: &mut String, title: &str, lines: &[ReportLine]) {
    if lines.is_empty() {
        return;
    }
    body.push_str(CRLF);
    body.push_str(title);
    body.push_str(CRLF);
    for (index, line) in lines.iter().enumerate() {
        body.push_str(&format!("{index}) {}", line.path.display()));
        if let Some(message) = &line.error_message {
            body.push_str(" | ");
            body.push_str(message);
        }
        body.push_str(CRLF);
    }
}
