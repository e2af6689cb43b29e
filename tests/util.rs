#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;

use conversion_reporter_lib::cycle::CycleConfig;
use conversion_reporter_lib::mailer::Mailer;
use conversion_reporter_lib::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub subject: String,
    pub body: String,
}

/// Mailer that keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, subject: &str, body: &str) -> AppResult<()> {
        if self.fail {
            return Err(AppError::new("MAIL/TRANSIENT", "relay refused connection"));
        }
        self.sent.lock().unwrap().push(SentMail {
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// An error directory populated with empty files and folders.
pub fn error_dir(files: &[&str], folders: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in files {
        fs::write(dir.path().join(name), b"%PDF-1.4").unwrap();
    }
    for name in folders {
        fs::create_dir_all(dir.path().join(name)).unwrap();
        fs::write(dir.path().join(name).join("page1.tif"), b"II*").unwrap();
    }
    dir
}

pub fn cycle_config(dir: &Path) -> CycleConfig {
    CycleConfig {
        error_dir: dir.to_path_buf(),
        folder_prefix: "item".to_string(),
        subject_prefix: "PDF Neevia Converter Error".to_string(),
    }
}

pub fn failure_text(path: &Path) -> String {
    format!("Failed to convert: ({})", path.display())
}

/// SQLite item database on disk, shaped like the production item table.
pub struct ItemDb {
    _dir: TempDir,
    pub path: PathBuf,
    pub pool: SqlitePool,
}

impl ItemDb {
    pub async fn create() -> ItemDb {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.sqlite3");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&format!("sqlite://{}?mode=rwc", path.display()))
            .await
            .expect("create sqlite items db");
        sqlx::query(
            "CREATE TABLE items (
                id INTEGER PRIMARY KEY,
                converted BOOLEAN NOT NULL DEFAULT 1,
                converter_error BOOLEAN NOT NULL DEFAULT 0,
                converter_errormsg TEXT
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        ItemDb {
            _dir: dir,
            path,
            pool,
        }
    }

    /// Connection URL for the store under test.
    pub fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }

    pub async fn seed(&self, id: i64, message: Option<&str>) {
        sqlx::query("INSERT INTO items (id, converter_errormsg) VALUES (?1, ?2)")
            .bind(id)
            .bind(message)
            .execute(&self.pool)
            .await
            .unwrap();
    }

    pub async fn row(&self, id: i64) -> Option<(bool, bool, Option<String>)> {
        sqlx::query_as(
            "SELECT converted, converter_error, converter_errormsg FROM items WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap()
    }
}
