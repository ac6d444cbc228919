//! The directory that holds workflow documents
//!
//! A [`ContentRoot`] is injected into every component that touches document
//! files so nothing depends on the process working directory.

use crate::error::{FlowkeepError, Result};
use crate::security::validate_file_name;
use crate::workflow::WorkflowId;
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Root directory plus document extension
#[derive(Debug, Clone)]
pub struct ContentRoot {
    root: PathBuf,
    extension: String,
}

impl ContentRoot {
    /// Create a content root; nothing is touched on disk
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    /// The root directory
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Document extension, without the dot
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Create the root directory if needed
    pub fn ensure_exists(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// `{identity}.{ext}`
    pub fn canonical_location(&self, id: &WorkflowId) -> String {
        format!("{}.{}", id, self.extension)
    }

    /// Check that `location` is a bare document file name under this root
    pub fn validate_location(&self, location: &str) -> Result<()> {
        validate_file_name(location)?;
        let suffix = format!(".{}", self.extension);
        if !location.ends_with(&suffix) || location.len() == suffix.len() {
            return Err(FlowkeepError::InvalidLocation(format!(
                "{location} (expected a '*{suffix}' file name)"
            )));
        }
        Ok(())
    }

    /// Absolute-or-relative path of a validated location
    pub fn path_for(&self, location: &str) -> Result<PathBuf> {
        self.validate_location(location)?;
        Ok(self.root.join(location))
    }

    /// Whether the document currently exists in the working tree
    pub fn exists(&self, location: &str) -> Result<bool> {
        Ok(self.path_for(location)?.is_file())
    }

    /// Read a document; a missing file is `NotFound`
    pub fn read(&self, location: &str) -> Result<String> {
        let path = self.path_for(location)?;
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FlowkeepError::NotFound(location.to_string()),
            _ => FlowkeepError::Io(e),
        })
    }

    /// Write a document, replacing any existing content
    pub fn write(&self, location: &str, content: &str) -> Result<()> {
        let path = self.path_for(location)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Remove a document; returns whether it existed
    pub fn remove(&self, location: &str) -> Result<bool> {
        let path = self.path_for(location)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Last modification time, `None` when the document is absent
    pub fn modified(&self, location: &str) -> Result<Option<DateTime<Utc>>> {
        let path = self.path_for(location)?;
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(DateTime::<Utc>::from(meta.modified()?))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_canonical_location() {
        let root = ContentRoot::new("/tmp/x", "yaml");
        let id = WorkflowId::from_string("01HZX").unwrap();
        assert_eq!(root.canonical_location(&id), "01HZX.yaml");
    }

    #[test]
    fn test_validate_location() {
        let root = ContentRoot::new("/tmp/x", "yaml");
        assert!(root.validate_location("abc.yaml").is_ok());
        for bad in ["abc.yml", ".yaml", "../abc.yaml", "sub/abc.yaml", ""] {
            let err = root.validate_location(bad).unwrap_err();
            assert!(matches!(err, FlowkeepError::InvalidLocation(_)), "{bad:?}");
        }
    }

    #[test]
    fn test_read_write_remove() {
        let temp = TempDir::new().unwrap();
        let root = ContentRoot::new(temp.path(), "yaml");

        assert!(root.read("a.yaml").unwrap_err().is_not_found());
        assert_eq!(root.modified("a.yaml").unwrap(), None);

        root.write("a.yaml", "workflow: {}\n").unwrap();
        assert!(root.exists("a.yaml").unwrap());
        assert_eq!(root.read("a.yaml").unwrap(), "workflow: {}\n");
        assert!(root.modified("a.yaml").unwrap().is_some());

        assert!(root.remove("a.yaml").unwrap());
        assert!(!root.remove("a.yaml").unwrap());
        assert!(!root.exists("a.yaml").unwrap());
    }
}
