//! `$FILE{}` reference resolution
//!
//! A task field whose whole value is `$FILE{"path"}` (or the unquoted
//! `$FILE{path}`) stands for the content of that file. The file is looked up
//! under a fixed search root and must stay inside it.

use crate::error::{FlowkeepError, Result};
use crate::security::{validate_path_security, MAX_REFERENCED_FILE_SIZE};
use regex::Regex;
use serde::Serialize;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Subdirectory searched after the root itself
pub const RESOURCES_DIR: &str = "resources";

/// A field value tagged with where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum FieldValue {
    /// Written directly in the document
    Inline {
        /// The value as written
        value: Value,
    },
    /// Inlined from a referenced file
    File {
        /// The reference as written, without the `$FILE{}` wrapper
        reference: String,
        /// The file content
        content: String,
    },
    /// A reference that could not be resolved
    Error {
        /// The reference as written
        reference: String,
        /// Why resolution failed
        message: String,
    },
}

impl FieldValue {
    /// The value to hand to a consumer: inline values as-is, file content
    /// as a string, `None` for unresolved references
    pub fn effective(&self) -> Option<Value> {
        match self {
            FieldValue::Inline { value } => Some(value.clone()),
            FieldValue::File { content, .. } => Some(Value::String(content.clone())),
            FieldValue::Error { .. } => None,
        }
    }

    /// True for an unresolved reference
    pub fn is_error(&self) -> bool {
        matches!(self, FieldValue::Error { .. })
    }
}

/// Resolves `$FILE{}` placeholders against a search root
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    root: PathBuf,
    pattern: Regex,
}

impl ReferenceResolver {
    /// Create a resolver searching `root` then `root/resources`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let pattern = Regex::new(r#"^\$FILE\{\s*(?:"([^"}]+)"|([^"}\s][^"}]*?))\s*\}$"#)
            .map_err(|e| {
                FlowkeepError::ParseFailure(format!("Failed to compile reference regex: {e}"))
            })?;
        Ok(Self {
            root: root.into(),
            pattern,
        })
    }

    /// The search root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extract the reference from a field value, if it is a placeholder
    pub fn reference_in<'a>(&self, value: &'a str) -> Option<&'a str> {
        let captures = self.pattern.captures(value.trim())?;
        captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str())
    }

    /// Locate a referenced file: `root/ref`, then `root/resources/ref`
    ///
    /// A candidate counts only if it exists and its canonical path is inside
    /// the canonical root.
    pub fn locate(&self, reference: &str) -> Result<PathBuf> {
        let relative = Path::new(reference);
        let candidates = [relative.to_path_buf(), Path::new(RESOURCES_DIR).join(relative)];

        let mut rejected = None;
        for candidate in &candidates {
            match validate_path_security(candidate, &self.root) {
                Ok(path) if path.is_file() => return Ok(path),
                Ok(_) => {}
                Err(e @ FlowkeepError::InvalidLocation(_)) => {
                    tracing::warn!("Rejected reference '{}': {}", reference, e);
                    rejected = Some(e);
                }
                Err(e) => tracing::debug!("Reference candidate {:?} unusable: {}", candidate, e),
            }
        }

        let reason = match rejected {
            Some(_) => "resolves outside the allowed root".to_string(),
            None => format!(
                "not found in {} or {}/{}",
                self.root.display(),
                self.root.display(),
                RESOURCES_DIR
            ),
        };
        Err(FlowkeepError::reference_unresolved(reference, reason))
    }

    /// Read the content of a referenced file
    pub fn resolve(&self, reference: &str) -> Result<String> {
        let path = self.locate(reference)?;
        let size = fs::metadata(&path)?.len();
        if size > MAX_REFERENCED_FILE_SIZE {
            return Err(FlowkeepError::reference_unresolved(
                reference,
                format!("file is {size} bytes, limit is {MAX_REFERENCED_FILE_SIZE}"),
            ));
        }
        fs::read_to_string(&path)
            .map_err(|e| FlowkeepError::reference_unresolved(reference, e.to_string()))
    }

    /// Tag a field value, resolving it when it is a placeholder
    pub fn resolve_field(&self, value: &Value) -> FieldValue {
        let Some(reference) = value.as_str().and_then(|s| self.reference_in(s)) else {
            return FieldValue::Inline {
                value: value.clone(),
            };
        };

        match self.resolve(reference) {
            Ok(content) => FieldValue::File {
                reference: reference.to_string(),
                content,
            },
            Err(e) => FieldValue::Error {
                reference: reference.to_string(),
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ReferenceResolver) {
        let outer = TempDir::new().unwrap();
        let root = outer.path().join("repo");
        fs::create_dir_all(root.join(RESOURCES_DIR)).unwrap();
        fs::write(root.join("top.sql"), "select 'top'").unwrap();
        fs::write(root.join(RESOURCES_DIR).join("q.sql"), "select 1").unwrap();
        fs::write(root.join(RESOURCES_DIR).join("top.sql"), "shadowed").unwrap();
        fs::write(outer.path().join("secret.txt"), "secret").unwrap();
        let resolver = ReferenceResolver::new(&root).unwrap();
        (outer, resolver)
    }

    #[test]
    fn test_reference_syntax() {
        let (_dir, resolver) = setup();
        assert_eq!(resolver.reference_in(r#"$FILE{"a/b.sql"}"#), Some("a/b.sql"));
        assert_eq!(resolver.reference_in("$FILE{a/b.sql}"), Some("a/b.sql"));
        assert_eq!(resolver.reference_in("  $FILE{ q.sql }  "), Some("q.sql"));
        assert_eq!(resolver.reference_in("select 1"), None);
        assert_eq!(resolver.reference_in("prefix $FILE{q.sql}"), None);
        assert_eq!(resolver.reference_in("$FILE{}"), None);
    }

    #[test]
    fn test_search_order_prefers_root() {
        let (_dir, resolver) = setup();
        assert_eq!(resolver.resolve("top.sql").unwrap(), "select 'top'");
        assert_eq!(resolver.resolve("q.sql").unwrap(), "select 1");
    }

    #[test]
    fn test_traversal_is_rejected() {
        let (_dir, resolver) = setup();
        let err = resolver.resolve("../secret.txt").unwrap_err();
        assert!(matches!(err, FlowkeepError::ReferenceUnresolved { .. }));

        let err = resolver.resolve("../../etc/passwd").unwrap_err();
        assert!(matches!(err, FlowkeepError::ReferenceUnresolved { .. }));

        assert!(resolver.resolve("/etc/passwd").is_err());
    }

    #[test]
    fn test_directory_is_not_a_match() {
        let (_dir, resolver) = setup();
        assert!(resolver.resolve(RESOURCES_DIR).is_err());
    }

    #[test]
    fn test_resolve_field_provenance() {
        let (_dir, resolver) = setup();

        let inline = resolver.resolve_field(&Value::String("echo hi".into()));
        assert_eq!(
            inline,
            FieldValue::Inline {
                value: Value::String("echo hi".into())
            }
        );

        let number = resolver.resolve_field(&Value::from(3));
        assert_eq!(number.effective(), Some(Value::from(3)));

        let file = resolver.resolve_field(&Value::String(r#"$FILE{"q.sql"}"#.into()));
        assert_eq!(
            file,
            FieldValue::File {
                reference: "q.sql".into(),
                content: "select 1".into()
            }
        );

        let missing = resolver.resolve_field(&Value::String("$FILE{nope.sql}".into()));
        assert!(missing.is_error());
        assert_eq!(missing.effective(), None);
    }
}
