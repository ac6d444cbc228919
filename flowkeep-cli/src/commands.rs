//! Command handlers
//!
//! Each handler opens the store from the resolved configuration, performs a
//! single store operation and prints its result.

use crate::cli::{Commands, OutputFormat};
use crate::completions;
use crate::display;
use crate::error::{CliError, CliResult};
use crate::exit_codes::EXIT_ERROR;
use flowkeep::workflow::{DagIssue, DefinitionParser};
use flowkeep::{FlowkeepError, RevisionId, StoreConfig, WorkflowId, WorkflowStore};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Resolve the store configuration, letting `--root` win over every other layer
pub fn load_config(root: Option<PathBuf>) -> CliResult<StoreConfig> {
    let mut config = StoreConfig::load().map_err(FlowkeepError::from)?;
    if let Some(root) = root {
        config.root = root;
    }
    Ok(config)
}

/// Accept either a display name or an identity
fn resolve_workflow(store: &WorkflowStore, workflow: &str) -> CliResult<WorkflowId> {
    if let Some(found) = store.find_by_name(workflow)? {
        return Ok(found.id);
    }
    Ok(WorkflowId::from_string(workflow)?)
}

fn read_document(file: Option<&Path>) -> CliResult<String> {
    match file {
        Some(path) => fs::read_to_string(path).map_err(|e| CliError {
            message: format!("Failed to read {}: {e}", path.display()),
            exit_code: EXIT_ERROR,
            source: Some(Box::new(e)),
        }),
        None => {
            let mut content = String::new();
            io::stdin().read_to_string(&mut content)?;
            Ok(content)
        }
    }
}

pub fn run(command: Commands, config: &StoreConfig) -> CliResult<()> {
    match command {
        Commands::Completion { shell } => completions::print_completion(shell),
        Commands::Parse {
            file,
            search_root,
            format,
        } => run_parse(&file, search_root, format),
        other => run_store_command(other, config),
    }
}

fn run_store_command(command: Commands, config: &StoreConfig) -> CliResult<()> {
    let store = WorkflowStore::open(config)?;

    match command {
        Commands::Init { demo } => {
            println!("Store ready at {}", config.root.display());
            if demo {
                match store.seed_demo()? {
                    Some(outcome) => println!("Created demo workflow tutorial ({})", outcome.id),
                    None => println!("Store is not empty; demo workflow skipped"),
                }
            }
        }
        Commands::Save { name, file, from } => {
            let content = read_document(file.as_deref())?;
            let outcome = store.save(&name, &content, from.as_deref())?;
            let verb = if outcome.created { "Created" } else { "Updated" };
            match &outcome.revision {
                Some(revision) => println!(
                    "{verb} workflow {name} ({}) at revision {}",
                    outcome.id,
                    revision.short()
                ),
                None => println!("Workflow {name} ({}) unchanged", outcome.id),
            }
        }
        Commands::List { format } => display::workflows(&store.list()?, format)?,
        Commands::Get { workflow } => {
            let id = resolve_workflow(&store, &workflow)?;
            print!("{}", store.read(&id)?.content);
        }
        Commands::Dag { workflow, format } => {
            let id = resolve_workflow(&store, &workflow)?;
            display::dag(&store.dag(&id)?, format)?;
        }
        Commands::Delete { workflow } => {
            let id = resolve_workflow(&store, &workflow)?;
            match store.delete(&id)? {
                Some(revision) => println!("Deleted {workflow} at revision {}", revision.short()),
                None => println!("Deleted index record of {workflow}"),
            }
        }
        Commands::Deleted { format, show } => match show.as_deref() {
            Some([location, revision]) => {
                print!("{}", store.deleted_content(location, revision)?);
            }
            _ => display::deleted(&store.list_deleted()?, format)?,
        },
        Commands::Restore { location, revision } => {
            let outcome = store.restore(&location, &revision)?;
            println!("Restored {}", outcome.location);
            if !outcome.indexed {
                println!("Index record not re-created; see the log for details");
            }
        }
        Commands::Revert { workflow, revision } => {
            let id = resolve_workflow(&store, &workflow)?;
            match store.revert(&id, &revision)? {
                Some(new) => println!("Reverted {workflow}; new revision {}", new.short()),
                None => println!("{workflow} already matches {revision}"),
            }
        }
        Commands::History { workflow, format } => {
            let id = resolve_workflow(&store, &workflow)?;
            display::history(&store.history(&id)?, format)?;
        }
        Commands::Diff { workflow, revision } => {
            let id = resolve_workflow(&store, &workflow)?;
            print!("{}", store.diff(&id, &revision)?);
        }
        Commands::Submit { workflow } => {
            let id = resolve_workflow(&store, &workflow)?;
            let submission = store.prepare_submission(&id)?;
            println!("# revision: {}", submission.revision);
            print!("{}", submission.document.to_yaml()?);
        }
        Commands::MarkSubmitted { workflow, revision } => {
            let id = resolve_workflow(&store, &workflow)?;
            let revision = RevisionId::new(revision);
            store.record_submission(&id, &revision)?;
            println!("Marked {workflow} as synced at {}", revision.short());
        }
        Commands::Completion { .. } | Commands::Parse { .. } => {}
    }
    Ok(())
}

fn run_parse(file: &Path, search_root: Option<PathBuf>, format: OutputFormat) -> CliResult<()> {
    let content = read_document(Some(file))?;
    let search_root = search_root
        .or_else(|| file.parent().map(Path::to_path_buf))
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("."));

    let view = DefinitionParser::new(search_root)?.parse(&content);
    if let Some(DagIssue::ParseFailure { message }) = view.issues.first() {
        return Err(CliError::new(
            format!("{}: {message}", file.display()),
            EXIT_ERROR,
        ));
    }
    display::dag(&view, format)
}
