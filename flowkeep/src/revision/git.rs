//! Git-backed revision store
//!
//! Drives the `git` executable inside the content root. Every command runs
//! with the root as its working directory; nothing depends on the process
//! working directory.

use super::{Deletion, Revision, RevisionId, RevisionStore};
use crate::config::CommitAuthor;
use crate::error::{FlowkeepError, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::{Mutex, PoisonError};

const FIELD_SEP: char = '\x1f';
const LOG_FORMAT: &str = "--format=%H%x1f%an%x1f%at%x1f%s";
const DELETION_MARKER: &str = "commit\x1f";

/// [`RevisionStore`] over a git working tree
#[derive(Debug)]
pub struct GitRevisionStore {
    work_dir: PathBuf,
    author: CommitAuthor,
    write_lock: Mutex<()>,
}

impl GitRevisionStore {
    /// Create a store over `work_dir`; call
    /// [`RevisionStore::ensure_initialized`] before use
    pub fn new(work_dir: impl Into<PathBuf>, author: CommitAuthor) -> Self {
        Self {
            work_dir: work_dir.into(),
            author,
            write_lock: Mutex::new(()),
        }
    }

    /// The repository working tree
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        tracing::debug!("git {}", args.join(" "));
        Command::new("git")
            .current_dir(&self.work_dir)
            .args(["-c", "core.quotepath=off"])
            .args(args)
            .output()
            .map_err(|e| FlowkeepError::git_operation_failed(args[0], &e.to_string()))
    }

    /// Run a git command and return stdout, failing on a non-zero exit
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FlowkeepError::git_command_failed(
                &args.join(" "),
                output.status.code().unwrap_or(-1),
                &stderr,
            ));
        }
        String::from_utf8(output.stdout).map_err(|e| {
            FlowkeepError::git_operation_failed(args[0], &format!("non UTF-8 output: {e}"))
        })
    }

    fn succeeds(&self, args: &[&str]) -> Result<bool> {
        Ok(self.output(args)?.status.success())
    }

    fn ensure_config(&self, key: &str, value: &str) -> Result<()> {
        let current = self.output(&["config", "--local", "--get", key])?;
        if current.status.success() && !String::from_utf8_lossy(&current.stdout).trim().is_empty()
        {
            return Ok(());
        }
        self.run(&["config", "--local", key, value])?;
        Ok(())
    }

    fn has_changes(&self, location: &str) -> Result<bool> {
        let status = self.run(&["status", "--porcelain", "--", location])?;
        Ok(!status.trim().is_empty())
    }

    /// Commit `locations`; the caller holds `write_lock`
    fn commit_locked(&self, locations: &[&str], message: &str) -> Result<Option<RevisionId>> {
        let mut changed = Vec::new();
        for location in locations {
            if self.has_changes(location)? {
                changed.push(*location);
            }
        }
        if changed.is_empty() {
            tracing::debug!("No changes in {:?}, skipping commit", locations);
            return Ok(None);
        }

        let mut add = vec!["add", "--all", "--"];
        add.extend(changed.iter().copied());
        self.run(&add)?;

        let name = format!("user.name={}", self.author.name);
        let email = format!("user.email={}", self.author.email);
        let mut commit = vec![
            "-c",
            name.as_str(),
            "-c",
            email.as_str(),
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "-m",
            message,
            "--",
        ];
        commit.extend(changed.iter().copied());
        self.run(&commit)?;

        let head = self.head()?.ok_or_else(|| {
            FlowkeepError::git_operation_failed("commit", "HEAD missing after commit")
        })?;
        tracing::info!("Committed {} ({}): {}", changed.join(", "), head.short(), message);
        Ok(Some(head))
    }

    fn parse_log_line(line: &str) -> Option<Revision> {
        let mut fields = line.splitn(4, FIELD_SEP);
        let id = fields.next()?.trim();
        let author = fields.next()?;
        let seconds: i64 = fields.next()?.parse().ok()?;
        let message = fields.next().unwrap_or_default();
        if id.is_empty() {
            return None;
        }
        Some(Revision {
            id: RevisionId::new(id),
            author: author.to_string(),
            timestamp: DateTime::<Utc>::from_timestamp(seconds, 0)?,
            message: message.to_string(),
        })
    }
}

impl RevisionStore for GitRevisionStore {
    fn ensure_initialized(&self) -> Result<()> {
        fs::create_dir_all(&self.work_dir)?;

        if !self.work_dir.join(".git").exists() {
            self.run(&["init", "--quiet"])?;
            tracing::info!("Initialized workflow repository at {:?}", self.work_dir);
        }

        self.ensure_config("user.name", &self.author.name)?;
        self.ensure_config("user.email", &self.author.email)?;
        Ok(())
    }

    fn commit(&self, locations: &[&str], message: &str) -> Result<Option<RevisionId>> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.commit_locked(locations, message)
    }

    fn resolve(&self, revision: &str) -> Result<RevisionId> {
        let revision = revision.trim();
        if revision.is_empty() || revision.starts_with('-') {
            return Err(FlowkeepError::NotFound(format!("revision '{revision}'")));
        }
        let spec = format!("{revision}^{{commit}}");
        let output = self.output(&["rev-parse", "--verify", "--quiet", &spec])?;
        if !output.status.success() {
            return Err(FlowkeepError::NotFound(format!("revision '{revision}'")));
        }
        Ok(RevisionId::new(
            String::from_utf8_lossy(&output.stdout).trim(),
        ))
    }

    fn head(&self) -> Result<Option<RevisionId>> {
        let output = self.output(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(RevisionId::new(
            String::from_utf8_lossy(&output.stdout).trim(),
        )))
    }

    fn parent(&self, revision: &RevisionId) -> Result<Option<RevisionId>> {
        let spec = format!("{revision}^");
        let output = self.output(&["rev-parse", "--verify", "--quiet", &spec])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(RevisionId::new(
            String::from_utf8_lossy(&output.stdout).trim(),
        )))
    }

    fn history(&self, location: &str, since: Option<&RevisionId>) -> Result<Vec<Revision>> {
        if self.head()?.is_none() {
            return Ok(Vec::new());
        }

        let range = since.map(|rev| format!("{rev}..HEAD"));
        let mut args = vec!["log", "--follow", LOG_FORMAT];
        if let Some(ref range) = range {
            args.push(range);
        }
        args.extend(["--", location]);

        let mut revisions = Vec::new();
        for line in self.run(&args)?.lines().filter(|l| !l.trim().is_empty()) {
            let Some(revision) = Self::parse_log_line(line) else {
                tracing::warn!("Skipping unparsable git log line: {:?}", line);
                continue;
            };
            // --follow can attribute commits of other files through rename detection
            if self.exists_at(location, &revision.id)? {
                revisions.push(revision);
            }
        }
        Ok(revisions)
    }

    fn last_deleting_revision(&self, location: &str) -> Result<Option<RevisionId>> {
        if self.head()?.is_none() {
            return Ok(None);
        }
        let out = self.run(&[
            "log",
            "--diff-filter=D",
            "--format=%H",
            "-n",
            "1",
            "--",
            location,
        ])?;
        Ok(out
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(RevisionId::new))
    }

    fn deletions(&self, extension: &str) -> Result<Vec<Deletion>> {
        if self.head()?.is_none() {
            return Ok(Vec::new());
        }

        let pathspec = format!("*.{extension}");
        let suffix = format!(".{extension}");
        let out = self.run(&[
            "log",
            "--diff-filter=D",
            "--summary",
            "--format=commit%x1f%H",
            "--",
            &pathspec,
        ])?;

        let mut deletions = Vec::new();
        let mut current: Option<RevisionId> = None;
        for line in out.lines() {
            if let Some(hash) = line.strip_prefix(DELETION_MARKER) {
                current = Some(RevisionId::new(hash.trim()));
                continue;
            }
            let Some(rest) = line.trim().strip_prefix("delete mode ") else {
                continue;
            };
            let Some((_mode, location)) = rest.split_once(' ') else {
                continue;
            };
            if let (Some(revision), true) = (&current, location.ends_with(&suffix)) {
                deletions.push(Deletion {
                    location: location.to_string(),
                    revision: revision.clone(),
                });
            }
        }
        Ok(deletions)
    }

    fn exists_at(&self, location: &str, revision: &RevisionId) -> Result<bool> {
        let object = format!("{revision}:{location}");
        self.succeeds(&["cat-file", "-e", &object])
    }

    fn content_at(&self, location: &str, revision: &RevisionId) -> Result<String> {
        if !self.exists_at(location, revision)? {
            return Err(FlowkeepError::NotFound(format!(
                "{location} at revision {}",
                revision.short()
            )));
        }
        let object = format!("{revision}:{location}");
        self.run(&["show", &object])
    }

    fn diff(&self, location: &str, revision: &RevisionId) -> Result<String> {
        match self.parent(revision)? {
            None => self.run(&["show", "--pretty=format:", revision.as_str(), "--", location]),
            Some(_) => {
                let range = format!("{revision}^!");
                self.run(&["diff", &range, "--", location])
            }
        }
    }

    fn restore_from(
        &self,
        location: &str,
        revision: &RevisionId,
        message: &str,
    ) -> Result<Option<RevisionId>> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.run(&["checkout", revision.as_str(), "--", location])?;
        self.commit_locked(&[location], message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, GitRevisionStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = GitRevisionStore::new(
            temp_dir.path(),
            CommitAuthor::new("Test User", "test@example.com"),
        );
        store.ensure_initialized().unwrap();
        (temp_dir, store)
    }

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn test_ensure_initialized_is_idempotent() {
        let (temp_dir, store) = create_test_store();
        store.ensure_initialized().unwrap();
        assert!(temp_dir.path().join(".git").exists());
        assert_eq!(store.head().unwrap(), None);
    }

    #[test]
    fn test_commit_skips_unchanged() {
        let (temp_dir, store) = create_test_store();
        write(&temp_dir, "a.yaml", "one\n");

        let first = store.commit(&["a.yaml"], "Create a").unwrap();
        assert!(first.is_some());
        assert_eq!(store.commit(&["a.yaml"], "Again").unwrap(), None);
        assert_eq!(store.head().unwrap(), first);
    }

    #[test]
    fn test_history_newest_first_with_author() {
        let (temp_dir, store) = create_test_store();
        write(&temp_dir, "a.yaml", "one\n");
        store.commit(&["a.yaml"], "Create a").unwrap();
        write(&temp_dir, "a.yaml", "two\n");
        store.commit(&["a.yaml"], "Update a").unwrap();

        let history = store.history("a.yaml", None).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "Update a");
        assert_eq!(history[1].message, "Create a");
        assert_eq!(history[0].author, "Test User");
    }

    #[test]
    fn test_deletion_and_restore() {
        let (temp_dir, store) = create_test_store();
        write(&temp_dir, "a.yaml", "one\n");
        let created = store.commit(&["a.yaml"], "Create a").unwrap().unwrap();

        fs::remove_file(temp_dir.path().join("a.yaml")).unwrap();
        let deleted = store.commit(&["a.yaml"], "Delete a").unwrap().unwrap();

        assert_eq!(store.last_deleting_revision("a.yaml").unwrap(), Some(deleted.clone()));
        assert_eq!(
            store.deletions("yaml").unwrap(),
            vec![Deletion {
                location: "a.yaml".into(),
                revision: deleted.clone(),
            }]
        );
        assert!(!store.exists_at("a.yaml", &deleted).unwrap());
        assert_eq!(store.parent(&deleted).unwrap(), Some(created.clone()));
        assert_eq!(store.content_at("a.yaml", &created).unwrap(), "one\n");
        assert!(store.content_at("a.yaml", &deleted).unwrap_err().is_not_found());

        let restored = store
            .restore_from("a.yaml", &created, "Restore a")
            .unwrap()
            .unwrap();
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("a.yaml")).unwrap(),
            "one\n"
        );
        assert_eq!(store.content_at("a.yaml", &restored).unwrap(), "one\n");

        let lifetime = store.history("a.yaml", Some(&deleted)).unwrap();
        assert_eq!(lifetime.len(), 1);
        assert_eq!(lifetime[0].id, restored);
    }

    #[test]
    fn test_commit_leaves_other_staged_files_alone() {
        let (temp_dir, store) = create_test_store();
        write(&temp_dir, "a.yaml", "one\n");
        write(&temp_dir, "b.yaml", "staged elsewhere\n");
        store.run(&["add", "--", "b.yaml"]).unwrap();

        let revision = store.commit(&["a.yaml"], "Create a").unwrap().unwrap();
        assert!(store.exists_at("a.yaml", &revision).unwrap());
        assert!(!store.exists_at("b.yaml", &revision).unwrap());

        let later = store.commit(&["b.yaml"], "Create b").unwrap().unwrap();
        assert!(store.exists_at("b.yaml", &later).unwrap());
    }

    #[test]
    fn test_deletions_ignore_other_extensions() {
        let (temp_dir, store) = create_test_store();
        write(&temp_dir, "a.yaml", "one\n");
        write(&temp_dir, "notes.txt", "x\n");
        store.commit(&["a.yaml", "notes.txt"], "Add").unwrap();
        fs::remove_file(temp_dir.path().join("notes.txt")).unwrap();
        store.commit(&["notes.txt"], "Drop notes").unwrap();

        assert!(store.deletions("yaml").unwrap().is_empty());
    }

    #[test]
    fn test_diff_root_and_child() {
        let (temp_dir, store) = create_test_store();
        write(&temp_dir, "a.yaml", "one\n");
        let root = store.commit(&["a.yaml"], "Create a").unwrap().unwrap();
        write(&temp_dir, "a.yaml", "two\n");
        let child = store.commit(&["a.yaml"], "Update a").unwrap().unwrap();

        assert_eq!(store.parent(&root).unwrap(), None);
        let root_diff = store.diff("a.yaml", &root).unwrap();
        assert!(root_diff.contains("+one"));

        let child_diff = store.diff("a.yaml", &child).unwrap();
        assert!(child_diff.contains("-one"));
        assert!(child_diff.contains("+two"));
    }

    #[test]
    fn test_resolve_rejects_unknown_and_option_like() {
        let (temp_dir, store) = create_test_store();
        write(&temp_dir, "a.yaml", "one\n");
        let rev = store.commit(&["a.yaml"], "Create a").unwrap().unwrap();

        assert_eq!(store.resolve(rev.short()).unwrap(), rev);
        assert!(store.resolve("deadbeef").unwrap_err().is_not_found());
        assert!(store.resolve("--all").unwrap_err().is_not_found());
    }

    #[test]
    fn test_history_empty_repository() {
        let (_temp_dir, store) = create_test_store();
        assert!(store.history("a.yaml", None).unwrap().is_empty());
        assert!(store.deletions("yaml").unwrap().is_empty());
        assert_eq!(store.last_deleting_revision("a.yaml").unwrap(), None);
    }
}
