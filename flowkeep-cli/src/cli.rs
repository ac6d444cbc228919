use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use is_terminal::IsTerminal;
use std::io;
use std::path::PathBuf;

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

#[derive(Parser, Debug)]
#[command(name = "flowkeep")]
#[command(version)]
#[command(about = "A versioned store for workflow definitions")]
#[command(long_about = "
flowkeep keeps workflow definitions in a git repository. Every workflow gets
a stable identity that survives renames, every change is a revision, and
deleted workflows can be listed and restored.

Example usage:
  flowkeep init --demo                  # Create the store with a sample workflow
  flowkeep save daily-export dag.yaml   # Create or update a workflow
  flowkeep list                         # Show stored workflows
  flowkeep dag daily-export             # Show tasks and dependencies
  flowkeep completion bash > ~/.bashrc.d/flowkeep
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Content root, overriding FLOWKEEP_ROOT and flowkeep.yaml
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the store if needed
    Init {
        /// Add the tutorial workflow when the store is empty
        #[arg(long)]
        demo: bool,
    },
    /// Create or update a workflow from a file or stdin
    #[command(long_about = "
Saves a workflow document. A document without workflow.uuid creates a new
workflow; a document carrying one updates that workflow, keeping its identity
even when the display name changes.

Examples:
  flowkeep save daily-export dag.yaml
  cat dag.yaml | flowkeep save daily-export
  flowkeep save daily-export dag.yaml --from daily-export.yaml  # migrate a legacy file
")]
    Save {
        /// Display name, unique across the store
        name: String,
        /// Document to read; stdin when omitted
        file: Option<PathBuf>,
        /// Location the document was loaded from, removed if it is not canonical
        #[arg(long)]
        from: Option<String>,
    },
    /// List stored workflows
    List {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Print a workflow document
    Get {
        /// Identity or display name
        workflow: String,
    },
    /// Show the tasks and dependency relations of a stored workflow
    Dag {
        /// Identity or display name
        workflow: String,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Parse a document without storing it
    Parse {
        /// Document to parse
        file: PathBuf,
        /// Directory that `$FILE{}` references resolve against
        #[arg(long)]
        search_root: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Delete a workflow
    Delete {
        /// Identity or display name
        workflow: String,
    },
    /// List deleted workflows that can be restored
    Deleted {
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
        /// Print the content of LOCATION as it was before REVISION
        #[arg(long, num_args = 2, value_names = ["LOCATION", "REVISION"])]
        show: Option<Vec<String>>,
    },
    /// Restore a deleted workflow
    Restore {
        /// Deleted location, as shown by `flowkeep deleted`
        location: String,
        /// The deleting revision
        revision: String,
    },
    /// Replace a workflow's content with an earlier revision
    Revert {
        /// Identity or display name
        workflow: String,
        /// Revision to take the content from
        revision: String,
    },
    /// Show the revisions of a workflow since its last deletion
    History {
        /// Identity or display name
        workflow: String,
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
    /// Show the change a revision made to a workflow
    Diff {
        /// Identity or display name
        workflow: String,
        /// Revision to show
        revision: String,
    },
    /// Print a workflow with every reference inlined, ready for submission
    Submit {
        /// Identity or display name
        workflow: String,
    },
    /// Record that a revision was accepted by the remote scheduler
    MarkSubmitted {
        /// Identity or display name
        workflow: String,
        /// The accepted revision
        revision: String,
    },
    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn try_parse_from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(args)
    }

    pub fn is_tty() -> bool {
        io::stdout().is_terminal()
    }

    pub fn should_use_color() -> bool {
        Self::is_tty() && std::env::var("NO_COLOR").is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_help_works() {
        let result = Cli::try_parse_from_args(["flowkeep", "--help"]);
        let error = result.unwrap_err();
        assert_eq!(error.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_no_subcommand_is_allowed() {
        let cli = Cli::try_parse_from_args(["flowkeep"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_save_with_migration_source() {
        let cli = Cli::try_parse_from_args([
            "flowkeep",
            "save",
            "daily-export",
            "dag.yaml",
            "--from",
            "daily-export.yaml",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Save { name, file, from }) => {
                assert_eq!(name, "daily-export");
                assert_eq!(file, Some(PathBuf::from("dag.yaml")));
                assert_eq!(from.as_deref(), Some("daily-export.yaml"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from_args(["flowkeep", "list", "--root", "/tmp/wf", "--quiet"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/wf")));
        assert!(matches!(
            cli.command,
            Some(Commands::List {
                format: OutputFormat::Table
            })
        ));
    }

    #[test]
    fn test_restore_requires_revision() {
        let err = Cli::try_parse_from_args(["flowkeep", "restore", "x.yaml"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_deleted_show_takes_two_values() {
        let cli = Cli::try_parse_from_args([
            "flowkeep", "deleted", "--show", "x.yaml", "abc123",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Deleted { show, .. }) => {
                assert_eq!(show, Some(vec!["x.yaml".to_string(), "abc123".to_string()]));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_mark_submitted_and_format() {
        let cli = Cli::try_parse_from_args([
            "flowkeep",
            "history",
            "daily-export",
            "--format",
            "json",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::History {
                format: OutputFormat::Json,
                ..
            })
        ));

        let cli =
            Cli::try_parse_from_args(["flowkeep", "mark-submitted", "daily-export", "abc123"])
                .unwrap();
        assert!(matches!(cli.command, Some(Commands::MarkSubmitted { .. })));
    }

    #[test]
    fn test_completion_shell() {
        let cli = Cli::try_parse_from_args(["flowkeep", "completion", "zsh"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Completion { shell: Shell::Zsh })
        ));
    }
}
