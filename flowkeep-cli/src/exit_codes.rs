//! Exit code constants for CLI commands
//!
//! - 0: Success
//! - 1: The workflow, location or revision was missing or conflicting
//! - 2: Invalid input, unreadable documents or backend failures

/// Successful execution
pub const EXIT_SUCCESS: i32 = 0;

/// Not found or conflict
pub const EXIT_WARNING: i32 = 1;

/// Everything else
pub const EXIT_ERROR: i32 = 2;
