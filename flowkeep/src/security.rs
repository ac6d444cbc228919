//! Security utilities for path validation and resource limits
//!
//! These checks keep every file the library reads or writes inside the
//! configured content root, no matter what a document or a caller asks for.

use crate::{FlowkeepError, Result};
use std::path::{Component, Path, PathBuf};

/// Maximum size in bytes of a file inlined through a `$FILE{}` reference
pub const MAX_REFERENCED_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of tasks + relations considered when checking for cycles
pub const MAX_WORKFLOW_COMPLEXITY: usize = 10_000;

/// Resolves `path` against `root` and checks that the result stays inside it
///
/// The path must be relative. It may contain `..` components as long as the
/// canonical target, after symlinks are followed, is still a descendant of
/// the canonical root. The target must exist.
///
/// # Returns
///
/// The canonical path on success, `NotFound` when the target does not exist,
/// `InvalidLocation` when it escapes the root.
pub fn validate_path_security(path: &Path, root: &Path) -> Result<PathBuf> {
    for component in path.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => {
                return Err(FlowkeepError::InvalidLocation(format!(
                    "{} (absolute paths are not allowed)",
                    path.display()
                )));
            }
            _ => {}
        }
    }

    let canonical_root = root.canonicalize().map_err(|e| {
        FlowkeepError::NotFound(format!("root directory '{}': {e}", root.display()))
    })?;

    let full_path = root.join(path);
    let canonical_path = full_path
        .canonicalize()
        .map_err(|_| FlowkeepError::NotFound(full_path.display().to_string()))?;

    if !canonical_path.starts_with(&canonical_root) {
        return Err(FlowkeepError::InvalidLocation(format!(
            "{} is outside the allowed directory",
            path.display()
        )));
    }

    Ok(canonical_path)
}

/// Checks that `name` is a bare file name: non-empty, no separators, not `.`
/// or `..`, and not hidden
pub fn validate_file_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
        || name.contains("..");

    if invalid {
        return Err(FlowkeepError::InvalidLocation(name.to_string()));
    }

    Ok(())
}
