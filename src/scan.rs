use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    File,
    Folder,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::File => "file",
            ItemKind::Folder => "folder",
        }
    }
}

/// A file or folder the converter left in the error directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorItem {
    pub kind: ItemKind,
    pub path: PathBuf,
    pub name: String,
}

impl ErrorItem {
    fn new(kind: ItemKind, path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { kind, path, name }
    }
}

/// Immediate children of the error directory, each list ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub files: Vec<ErrorItem>,
    pub folders: Vec<ErrorItem>,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }
}

#[derive(Error, Debug)]
#[error("cannot list error directory {}: {source}", .path.display())]
pub struct ScanError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl From<ScanError> for AppError {
    fn from(error: ScanError) -> Self {
        AppError::new("SCAN/UNREADABLE", "Could not list the error directory")
            .with_context("path", error.path.display().to_string())
            .with_cause(error.source)
    }
}

/// List the files and subdirectories directly under `dir`. Nothing below
/// the first level is visited. Symlinks are classified by their target;
/// entries that are neither (sockets, dangling links) are ignored.
pub fn scan_error_dir(dir: &Path) -> Result<ScanResult, ScanError> {
    let wrap = |source| ScanError {
        path: dir.to_path_buf(),
        source,
    };

    let mut result = ScanResult::default();
    for entry in fs::read_dir(dir).map_err(wrap)? {
        let entry = entry.map_err(wrap)?;
        let path = entry.path();
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        if metadata.is_dir() {
            result.folders.push(ErrorItem::new(ItemKind::Folder, path));
        } else if metadata.is_file() {
            result.files.push(ErrorItem::new(ItemKind::File, path));
        }
    }

    result.files.sort_by(|a, b| a.name.cmp(&b.name));
    result.folders.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(result)
}
