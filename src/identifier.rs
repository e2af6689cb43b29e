use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::scan::{ErrorItem, ItemKind};

/// Primary key of a row in the item table, as derived from a file or
/// folder name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemId {
    value: i64,
    digits: String,
}

impl ItemId {
    /// Parse a run of ASCII digits. Signs, whitespace and empty input are
    /// rejected so only names the converter produces can reach the database.
    pub fn parse(digits: &str) -> Option<ItemId> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value = digits.parse::<i64>().ok()?;
        Some(ItemId {
            value,
            digits: digits.to_string(),
        })
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    /// The digits exactly as they appeared in the name, leading zeros kept.
    pub fn digits(&self) -> &str {
        &self.digits
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digits)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("file name {name:?} has no stem")]
    MissingStem { name: String },
    #[error("folder name {name:?} does not start with {prefix:?}")]
    MissingPrefix { name: String, prefix: String },
    #[error("{name:?} does not carry a numeric item id (found {candidate:?})")]
    NotNumeric { name: String, candidate: String },
}

/// Map an error item to the id of its database row.
///
/// Files use the name without its extension (`12345.pdf` is `12345`).
/// Folders must be `<prefix><digits>` (`item00045812` is `00045812`).
pub fn resolve(item: &ErrorItem, folder_prefix: &str) -> Result<ItemId, IdentifierError> {
    match item.kind {
        ItemKind::File => resolve_file(&item.name),
        ItemKind::Folder => resolve_folder(&item.name, folder_prefix),
    }
}

fn resolve_file(name: &str) -> Result<ItemId, IdentifierError> {
    let stem = Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| IdentifierError::MissingStem {
            name: name.to_string(),
        })?;
    ItemId::parse(&stem).ok_or_else(|| IdentifierError::NotNumeric {
        name: name.to_string(),
        candidate: stem,
    })
}

fn resolve_folder(name: &str, prefix: &str) -> Result<ItemId, IdentifierError> {
    let rest = name
        .strip_prefix(prefix)
        .ok_or_else(|| IdentifierError::MissingPrefix {
            name: name.to_string(),
            prefix: prefix.to_string(),
        })?;
    ItemId::parse(rest).ok_or_else(|| IdentifierError::NotNumeric {
        name: name.to_string(),
        candidate: rest.to_string(),
    })
}
