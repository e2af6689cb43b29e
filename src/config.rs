use std::path::{Path, PathBuf};
use std::time::Duration;

use lettre::message::Mailbox;
use serde::Deserialize;

use crate::db::{StatementMode, TableName};
use crate::{AppError, AppResult};

pub const CONFIG_ENV: &str = "CONVERSION_REPORTER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "reporter.json";

const DEFAULT_EMAIL_PORT: u16 = 25;
const DEFAULT_ITEM_TABLE: &str = "items";
const DEFAULT_FOLDER_PREFIX: &str = "item";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_SUBJECT_PREFIX: &str = "PDF Neevia Converter Error";

/// Settings for one reporter process, read from a JSON document whose keys
/// keep the camelCase names operators already use.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Settings {
    pub conn_string: String,
    pub email_host: String,
    #[serde(default = "default_email_port")]
    pub email_port: u16,
    pub error_dir_path: PathBuf,
    pub from_address: String,
    pub to_address: String,
    #[serde(default)]
    pub looper_path: Option<PathBuf>,
    #[serde(default = "default_item_table")]
    pub item_table: String,
    #[serde(default = "default_folder_prefix")]
    pub folder_prefix: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    #[serde(default)]
    pub statement_mode: StatementMode,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_email_port() -> u16 {
    DEFAULT_EMAIL_PORT
}

fn default_item_table() -> String {
    DEFAULT_ITEM_TABLE.to_string()
}

fn default_folder_prefix() -> String {
    DEFAULT_FOLDER_PREFIX.to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_subject_prefix() -> String {
    DEFAULT_SUBJECT_PREFIX.to_string()
}

impl Settings {
    /// Read, parse and validate the settings file at `path`.
    pub fn load(path: &Path) -> AppResult<Settings> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::new("CONFIG/UNREADABLE", "Could not read the settings file")
                .with_context("path", path.display().to_string())
                .with_cause(err)
        })?;
        Settings::from_json(&raw)
            .map_err(|err| err.with_context("path", path.display().to_string()))
    }

    pub fn from_json(raw: &str) -> AppResult<Settings> {
        let settings: Settings = serde_json::from_str(raw).map_err(|err| {
            AppError::new("CONFIG/PARSE", "Settings are not valid").with_cause(err)
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> AppResult<()> {
        require_non_blank("connString", &self.conn_string)?;
        require_non_blank("emailHost", &self.email_host)?;
        require_non_blank("folderPrefix", &self.folder_prefix)?;
        if self.error_dir_path.as_os_str().is_empty() {
            return Err(missing("errorDirPath"));
        }
        if self.looper_path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            return Err(missing("looperPath"));
        }
        self.from_mailbox()?;
        self.to_mailbox()?;
        self.table_name()?;
        Ok(())
    }

    pub fn from_mailbox(&self) -> AppResult<Mailbox> {
        parse_mailbox("fromAddress", &self.from_address)
    }

    pub fn to_mailbox(&self) -> AppResult<Mailbox> {
        parse_mailbox("toAddress", &self.to_address)
    }

    pub fn table_name(&self) -> AppResult<TableName> {
        TableName::parse(&self.item_table).map_err(|err| {
            AppError::new("CONFIG/INVALID", err.to_string()).with_context("key", "itemTable")
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn missing(key: &str) -> AppError {
    AppError::new("CONFIG/MISSING_KEY", format!("Setting {key} must not be empty"))
        .with_context("key", key)
}

fn require_non_blank(key: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        Err(missing(key))
    } else {
        Ok(())
    }
}

fn parse_mailbox(key: &str, value: &str) -> AppResult<Mailbox> {
    require_non_blank(key, value)?;
    value.trim().parse::<Mailbox>().map_err(|err| {
        AppError::new("CONFIG/INVALID", format!("Setting {key} is not a mail address"))
            .with_context("key", key)
            .with_cause(err)
    })
}
