use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::identifier::ItemId;
use crate::{AppError, AppResult};

/// The slice of an item row this tool reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRow {
    pub error_message: Option<String>,
}

/// Access to the external item table. Implementations open whatever
/// connection they need per call and hold nothing between calls.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Fetch the row for `id`, `None` when no such row exists.
    async fn fetch(&self, id: &ItemId) -> AppResult<Option<ItemRow>>;

    /// Mark the row failed with `message`. Returns the number of rows touched.
    async fn mark_failed(&self, id: &ItemId, message: &str) -> AppResult<u64>;
}

/// Whether an item's failure is already on record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportState {
    /// Row exists and carries no error message yet.
    Unreported,
    /// Row already carries an error message.
    Reported,
    /// No row for this id; suppressed.
    Missing,
    /// The lookup failed; suppressed so nothing is reported twice.
    Unavailable(AppError),
}

impl ReportState {
    pub fn from_row(row: Option<ItemRow>) -> Self {
        match row {
            None => ReportState::Missing,
            Some(ItemRow {
                error_message: Some(message),
            }) if !message.trim().is_empty() => ReportState::Reported,
            Some(_) => ReportState::Unreported,
        }
    }

    pub fn should_report(&self) -> bool {
        matches!(self, ReportState::Unreported)
    }
}

/// Look up whether `id` still needs reporting.
pub async fn report_state<S: ItemStore + ?Sized>(store: &S, id: &ItemId) -> ReportState {
    match store.fetch(id).await {
        Ok(row) => ReportState::from_row(row),
        Err(err) => ReportState::Unavailable(err),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRow {
    pub converted: bool,
    pub converter_error: bool,
    pub error_message: Option<String>,
}

/// In-process item table for tests. Individual ids can be made to fail on
/// fetch or update.
#[derive(Default)]
pub struct MemoryItemStore {
    rows: Mutex<BTreeMap<i64, MemoryRow>>,
    failing_fetch: Mutex<HashSet<i64>>,
    failing_update: Mutex<HashSet<i64>>,
    fetches: Mutex<Vec<i64>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: i64, row: MemoryRow) {
        if let Ok(mut rows) = self.rows.lock() {
            rows.insert(id, row);
        }
    }

    pub fn row(&self, id: i64) -> Option<MemoryRow> {
        self.rows
            .lock()
            .map(|rows| rows.get(&id).cloned())
            .unwrap_or_default()
    }

    pub fn fail_fetch(&self, id: i64) {
        if let Ok(mut ids) = self.failing_fetch.lock() {
            ids.insert(id);
        }
    }

    pub fn fail_update(&self, id: i64) {
        if let Ok(mut ids) = self.failing_update.lock() {
            ids.insert(id);
        }
    }

    /// Ids passed to `fetch`, in call order.
    pub fn fetches(&self) -> Vec<i64> {
        self.fetches
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    fn fails(set: &Mutex<HashSet<i64>>, id: i64) -> bool {
        set.lock().map(|ids| ids.contains(&id)).unwrap_or(false)
    }

    fn poisoned() -> AppError {
        AppError::new("STORE/POISONED", "Memory store lock poisoned")
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn fetch(&self, id: &ItemId) -> AppResult<Option<ItemRow>> {
        if let Ok(mut fetches) = self.fetches.lock() {
            fetches.push(id.value());
        }
        if Self::fails(&self.failing_fetch, id.value()) {
            return Err(AppError::new("STORE/UNAVAILABLE", "Simulated lookup failure")
                .with_context("id", id.to_string()));
        }
        let rows = self.rows.lock().map_err(|_| Self::poisoned())?;
        Ok(rows.get(&id.value()).map(|row| ItemRow {
            error_message: row.error_message.clone(),
        }))
    }

    async fn mark_failed(&self, id: &ItemId, message: &str) -> AppResult<u64> {
        if Self::fails(&self.failing_update, id.value()) {
            return Err(AppError::new("STORE/UNAVAILABLE", "Simulated update failure")
                .with_context("id", id.to_string()));
        }
        let mut rows = self.rows.lock().map_err(|_| Self::poisoned())?;
        match rows.get_mut(&id.value()) {
            Some(row) => {
                row.converted = false;
                row.converter_error = true;
                row.error_message = Some(message.to_string());
                Ok(1)
            }
            None => Ok(0),
        }
    }
}
