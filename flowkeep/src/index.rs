//! Metadata index: identity to display name
//!
//! The index is a two-column lookup table used for name uniqueness checks
//! and listing. The store is its only writer.

use crate::error::{FlowkeepError, Result};
use crate::workflow::WorkflowId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// An index row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// Workflow identity
    pub id: WorkflowId,
    /// Display name, unique across identities
    pub name: String,
}

impl WorkflowRecord {
    /// Create a record
    pub fn new(id: WorkflowId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Storage behind the metadata index
pub trait MetadataIndex: Send + Sync {
    /// Point lookup by identity
    fn get(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>>;

    /// Point lookup by display name
    fn find_by_name(&self, name: &str) -> Result<Option<WorkflowRecord>>;

    /// Insert or rename a record
    ///
    /// Fails with `Conflict` when a different identity already owns the name.
    fn upsert(&self, record: WorkflowRecord) -> Result<()>;

    /// Remove a record; returns whether it existed
    fn remove(&self, id: &WorkflowId) -> Result<bool>;

    /// All records, ordered by display name
    fn list(&self) -> Result<Vec<WorkflowRecord>>;
}

/// In-process index, used by tests and embedders that keep their own table
#[derive(Debug, Default)]
pub struct MemoryMetadataIndex {
    records: DashMap<WorkflowId, String>,
}

impl MemoryMetadataIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataIndex for MemoryMetadataIndex {
    fn get(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>> {
        Ok(self
            .records
            .get(id)
            .map(|name| WorkflowRecord::new(id.clone(), name.value().clone())))
    }

    fn find_by_name(&self, name: &str) -> Result<Option<WorkflowRecord>> {
        Ok(self
            .records
            .iter()
            .find(|entry| entry.value() == name)
            .map(|entry| WorkflowRecord::new(entry.key().clone(), entry.value().clone())))
    }

    fn upsert(&self, record: WorkflowRecord) -> Result<()> {
        if let Some(owner) = self.find_by_name(&record.name)? {
            if owner.id != record.id {
                return Err(FlowkeepError::name_conflict(&record.name));
            }
        }
        self.records.insert(record.id, record.name);
        Ok(())
    }

    fn remove(&self, id: &WorkflowId) -> Result<bool> {
        Ok(self.records.remove(id).is_some())
    }

    fn list(&self) -> Result<Vec<WorkflowRecord>> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .map(|entry| WorkflowRecord::new(entry.key().clone(), entry.value().clone()))
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    workflows: Vec<WorkflowRecord>,
}

/// Index persisted as a JSON file, rewritten on every change
#[derive(Debug)]
pub struct FileMetadataIndex {
    path: PathBuf,
    records: Mutex<BTreeMap<WorkflowId, String>>,
}

impl FileMetadataIndex {
    /// Open the index at `path`; a missing file is an empty index
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => {
                let file: IndexFile = serde_json::from_str(&content)?;
                file.workflows.into_iter().map(|r| (r.id, r.name)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("Loaded {} index records from {:?}", records.len(), path);
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Location of the index file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, records: &BTreeMap<WorkflowId, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = IndexFile {
            workflows: records
                .iter()
                .map(|(id, name)| WorkflowRecord::new(id.clone(), name.clone()))
                .collect(),
        };
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&file)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl MetadataIndex for FileMetadataIndex {
    fn get(&self, id: &WorkflowId) -> Result<Option<WorkflowRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .get(id)
            .map(|name| WorkflowRecord::new(id.clone(), name.clone())))
    }

    fn find_by_name(&self, name: &str) -> Result<Option<WorkflowRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, n)| WorkflowRecord::new(id.clone(), n.clone())))
    }

    fn upsert(&self, record: WorkflowRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if records
            .iter()
            .any(|(id, name)| *name == record.name && *id != record.id)
        {
            return Err(FlowkeepError::name_conflict(&record.name));
        }
        records.insert(record.id, record.name);
        self.persist(&records)
    }

    fn remove(&self, id: &WorkflowId) -> Result<bool> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let existed = records.remove(id).is_some();
        if existed {
            self.persist(&records)?;
        }
        Ok(existed)
    }

    fn list(&self) -> Result<Vec<WorkflowRecord>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<_> = records
            .iter()
            .map(|(id, name)| WorkflowRecord::new(id.clone(), name.clone()))
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(s: &str) -> WorkflowId {
        WorkflowId::from_string(s).unwrap()
    }

    fn exercise(index: &dyn MetadataIndex) {
        index.upsert(WorkflowRecord::new(id("b"), "beta")).unwrap();
        index.upsert(WorkflowRecord::new(id("a"), "alpha")).unwrap();

        assert_eq!(index.get(&id("a")).unwrap().unwrap().name, "alpha");
        assert_eq!(index.find_by_name("beta").unwrap().unwrap().id, id("b"));
        assert!(index.find_by_name("gamma").unwrap().is_none());

        let err = index
            .upsert(WorkflowRecord::new(id("c"), "alpha"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);

        // Renaming to its own name is fine
        index.upsert(WorkflowRecord::new(id("a"), "alpha")).unwrap();
        index.upsert(WorkflowRecord::new(id("a"), "alpha-v2")).unwrap();

        let names: Vec<_> = index.list().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["alpha-v2", "beta"]);

        assert!(index.remove(&id("b")).unwrap());
        assert!(!index.remove(&id("b")).unwrap());
    }

    #[test]
    fn test_memory_index() {
        exercise(&MemoryMetadataIndex::new());
    }

    #[test]
    fn test_file_index_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("index.json");

        {
            let index = FileMetadataIndex::open(&path).unwrap();
            exercise(&index);
        }

        let reopened = FileMetadataIndex::open(&path).unwrap();
        let records = reopened.list().unwrap();
        assert_eq!(records, vec![WorkflowRecord::new(id("a"), "alpha-v2")]);
    }

    #[test]
    fn test_file_index_rejects_corrupt_json() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");
        fs::write(&path, "{not json").unwrap();

        assert!(FileMetadataIndex::open(&path).is_err());
    }
}
