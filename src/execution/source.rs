//! Where raw spreadsheet bytes come from.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::error::SourceError;

/// Supplies raw bytes for a file identity on demand.
pub trait DatasetSource: Send + Sync {
    fn fetch(&self, file_id: &str) -> Result<Vec<u8>, SourceError>;
}

/// Files registered in memory under an identity.
#[derive(Debug, Default)]
pub struct InMemorySource {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the bytes behind `file_id`.
    pub fn insert(&self, file_id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file_id.into(), bytes.into());
    }
}

impl DatasetSource for InMemorySource {
    fn fetch(&self, file_id: &str) -> Result<Vec<u8>, SourceError> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(file_id.to_string()))
    }
}

/// Files read from a directory, where the file identity is a file name inside it.
///
/// Identities that would escape the directory (absolute paths, `..`) are reported as not found.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, file_id: &str) -> Option<PathBuf> {
        let relative = Path::new(file_id);
        let contained = !file_id.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        contained.then(|| self.root.join(relative))
    }
}

impl DatasetSource for DirectorySource {
    fn fetch(&self, file_id: &str) -> Result<Vec<u8>, SourceError> {
        let path = self
            .resolve(file_id)
            .ok_or_else(|| SourceError::NotFound(file_id.to_string()))?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(file_id.to_string()))
            }
            Err(e) => Err(SourceError::Io(e)),
        }
    }
}
