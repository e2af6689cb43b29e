use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use sqlx::any::install_default_drivers;
use sqlx::{AnyConnection, Connection, Executor, Row};
use thiserror::Error;
use tracing::{debug, warn};

use crate::identifier::ItemId;
use crate::logging::LOG_TARGET;
use crate::store::{ItemRow, ItemStore};
use crate::{AppError, AppResult};

static TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .expect("table name pattern compiles")
});

/// A validated `table` or `schema.table` name, safe to splice into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0:?} is not a plain table name")]
pub struct TableNameError(pub String);

impl TableName {
    pub fn parse(raw: &str) -> Result<TableName, TableNameError> {
        if TABLE_NAME_RE.is_match(raw) {
            Ok(TableName(raw.to_string()))
        } else {
            Err(TableNameError(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How statements reach the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementMode {
    /// Bound parameters over a prepared statement.
    #[default]
    Bind,
    /// Plain SQL text over the simple query protocol, for poolers that do
    /// not support prepared statements. The id is inlined as an integer and
    /// the message as an escaped string literal.
    Literal,
}

/// Quote-escape `value` for use inside a single-quoted SQL literal.
/// Backslashes are doubled only when the server treats them as escapes,
/// i.e. `standard_conforming_strings` is off.
pub fn sql_escape(value: &str, standard_conforming_strings: bool) -> String {
    let quoted = value.replace('\'', "''");
    if standard_conforming_strings {
        quoted
    } else {
        quoted.replace('\\', "\\\\")
    }
}

/// Interpret the value of `SHOW standard_conforming_strings`.
pub fn is_standard_conforming(setting: &str) -> bool {
    !setting.trim().eq_ignore_ascii_case("off")
}

/// Item table reached through a connection URL. PostgreSQL in production;
/// any sqlx `Any` backend works, which lets tests use an SQLite file.
///
/// Each call opens one connection and closes it before returning.
pub struct SqlItemStore {
    url: String,
    table: TableName,
    mode: StatementMode,
}

impl SqlItemStore {
    pub fn new(url: impl Into<String>, table: TableName, mode: StatementMode) -> Self {
        install_default_drivers();
        Self {
            url: url.into(),
            table,
            mode,
        }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    fn select_sql(&self) -> String {
        format!("SELECT converter_errormsg FROM {} WHERE id = $1", self.table)
    }

    fn update_sql(&self) -> String {
        format!(
            "UPDATE {} SET converted = false, converter_error = true, converter_errormsg = $1 WHERE id = $2",
            self.table
        )
    }

    /// Run `f` on a fresh connection and close it afterwards, whether or
    /// not `f` succeeded.
    async fn with_connection<R, F>(&self, f: F) -> Result<R, sqlx::Error>
    where
        R: Send,
        F: for<'c> FnOnce(&'c mut AnyConnection) -> BoxFuture<'c, Result<R, sqlx::Error>>,
    {
        let mut conn = AnyConnection::connect(&self.url).await?;
        debug!(target: LOG_TARGET, event = "db_connect", backend = conn.backend_name());
        let result = f(&mut conn).await;
        if let Err(err) = conn.close().await {
            warn!(target: LOG_TARGET, event = "db_close_failed", error = %err);
        }
        result
    }
}

fn literal_update_sql(table: &TableName, id: &ItemId, escaped_message: &str) -> String {
    format!(
        "UPDATE {table} SET converted = false, converter_error = true, converter_errormsg = '{escaped_message}' WHERE id = {}",
        id.value()
    )
}

fn literal_select_sql(table: &TableName, id: &ItemId) -> String {
    format!("SELECT converter_errormsg FROM {table} WHERE id = {}", id.value())
}

/// Probe the server's backslash handling. Backends other than PostgreSQL
/// never treat backslashes as escapes.
fn probe_standard_conforming<'c>(
    conn: &'c mut AnyConnection,
) -> BoxFuture<'c, Result<bool, sqlx::Error>> {
    Box::pin(async move {
        if !conn.backend_name().eq_ignore_ascii_case("postgresql") {
            return Ok(true);
        }
        let row = (&mut *conn)
            .fetch_one("SHOW standard_conforming_strings")
            .await?;
        let setting: String = row.try_get(0)?;
        Ok(is_standard_conforming(&setting))
    })
}

#[async_trait]
impl ItemStore for SqlItemStore {
    async fn fetch(&self, id: &ItemId) -> AppResult<Option<ItemRow>> {
        let key = id.value();
        let message = match self.mode {
            StatementMode::Bind => {
                let sql = self.select_sql();
                self.with_connection(move |conn| {
                    Box::pin(async move {
                        sqlx::query_scalar::<_, Option<String>>(&sql)
                            .bind(key)
                            .fetch_optional(&mut *conn)
                            .await
                    })
                })
                .await
            }
            StatementMode::Literal => {
                let sql = literal_select_sql(&self.table, id);
                self.with_connection(move |conn| {
                    Box::pin(async move {
                        match (&mut *conn).fetch_optional(sql.as_str()).await? {
                            Some(row) => row.try_get::<Option<String>, _>(0).map(Some),
                            None => Ok(None),
                        }
                    })
                })
                .await
            }
        }
        .map_err(|err| AppError::from(err).with_context("id", id.to_string()))?;
        Ok(message.map(|error_message| ItemRow { error_message }))
    }

    async fn mark_failed(&self, id: &ItemId, message: &str) -> AppResult<u64> {
        let key = id.value();
        let message = message.to_string();
        let result = match self.mode {
            StatementMode::Bind => {
                let sql = self.update_sql();
                self.with_connection(move |conn| {
                    Box::pin(async move {
                        sqlx::query(&sql)
                            .bind(message)
                            .bind(key)
                            .execute(&mut *conn)
                            .await
                            .map(|done| done.rows_affected())
                    })
                })
                .await
            }
            StatementMode::Literal => {
                let table = self.table.clone();
                let id = id.clone();
                self.with_connection(move |conn| {
                    Box::pin(async move {
                        let standard = probe_standard_conforming(&mut *conn).await?;
                        let escaped = sql_escape(&message, standard);
                        let sql = literal_update_sql(&table, &id, &escaped);
                        (&mut *conn)
                            .execute(sql.as_str())
                            .await
                            .map(|done| done.rows_affected())
                    })
                })
                .await
            }
        };
        result.map_err(|err| AppError::from(err).with_context("id", id.to_string()))
    }
}
