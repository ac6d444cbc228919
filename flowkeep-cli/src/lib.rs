//! Flowkeep CLI Library
//!
//! Command-line definitions, command handlers and exit codes, exposed as a
//! library so the binary stays thin and the pieces can be tested directly.

/// Command-line interface definitions and argument parsing
pub mod cli;
/// Command handlers
pub mod commands;
/// Shell completion generation
pub mod completions;
/// Table, JSON and YAML rendering
pub mod display;
/// CLI error type and exit-code mapping
pub mod error;
/// Exit codes used by the CLI application
pub mod exit_codes;
