//! Rendering of store results as tables, JSON or YAML

use crate::cli::{Cli, OutputFormat};
use crate::error::CliResult;
use chrono::{DateTime, Local, Utc};
use colored::*;
use flowkeep::revision::Revision;
use flowkeep::workflow::DagView;
use flowkeep::{DeletedWorkflow, WorkflowSummary};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct WorkflowRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Identity")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Last modified")]
    last_modified: String,
}

#[derive(Tabled)]
struct DeletedRow {
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Deleted in")]
    revision: String,
}

#[derive(Tabled)]
struct RevisionRow {
    #[tabled(rename = "Revision")]
    revision: String,
    #[tabled(rename = "Author")]
    author: String,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "Task")]
    name: String,
    #[tabled(rename = "Type")]
    task_type: String,
    #[tabled(rename = "Depends on")]
    upstream: String,
}

fn local_time(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn print_structured<T: Serialize + ?Sized>(value: &T, format: OutputFormat) -> CliResult<bool> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Table => return Ok(false),
    }
    Ok(true)
}

fn print_table<R: Tabled>(rows: Vec<R>) {
    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{}", table);
}

pub fn workflows(summaries: &[WorkflowSummary], format: OutputFormat) -> CliResult<()> {
    if print_structured(summaries, format)? {
        return Ok(());
    }
    if summaries.is_empty() {
        println!("No workflows stored. Use {} to add one.", "flowkeep save".cyan());
        return Ok(());
    }

    let rows = summaries
        .iter()
        .map(|summary| WorkflowRow {
            name: summary.name.clone(),
            id: summary.id.to_string(),
            status: match (&summary.status, summary.consistent) {
                (Some(status), _) => status.clone(),
                (None, false) => "missing".to_string(),
                (None, true) => String::new(),
            },
            last_modified: summary.last_modified.map(local_time).unwrap_or_default(),
        })
        .collect();
    print_table::<WorkflowRow>(rows);

    let missing = summaries.iter().filter(|s| !s.consistent).count();
    if missing > 0 {
        let note = format!("{missing} indexed workflow(s) have no readable document");
        if Cli::should_use_color() {
            println!("{}", note.yellow());
        } else {
            println!("{note}");
        }
    }
    Ok(())
}

pub fn deleted(entries: &[DeletedWorkflow], format: OutputFormat) -> CliResult<()> {
    if print_structured(entries, format)? {
        return Ok(());
    }
    if entries.is_empty() {
        println!("No deleted workflows.");
        return Ok(());
    }

    let rows = entries
        .iter()
        .map(|entry| DeletedRow {
            location: entry.location.clone(),
            name: entry.name.clone(),
            revision: entry.revision.short().to_string(),
        })
        .collect();
    print_table::<DeletedRow>(rows);
    println!("Restore with {}", "flowkeep restore <LOCATION> <REVISION>".cyan());
    Ok(())
}

pub fn history(revisions: &[Revision], format: OutputFormat) -> CliResult<()> {
    if print_structured(revisions, format)? {
        return Ok(());
    }
    if revisions.is_empty() {
        println!("No revisions.");
        return Ok(());
    }

    let rows = revisions
        .iter()
        .map(|revision| RevisionRow {
            revision: revision.id.short().to_string(),
            author: revision.author.clone(),
            date: local_time(revision.timestamp),
            message: revision.message.clone(),
        })
        .collect();
    print_table::<RevisionRow>(rows);
    Ok(())
}

pub fn dag(view: &DagView, format: OutputFormat) -> CliResult<()> {
    if print_structured(view, format)? {
        return Ok(());
    }

    if let Some(schedule) = &view.schedule {
        println!("{} {}", "Schedule:".bold(), schedule);
    }

    let rows: Vec<TaskRow> = view
        .tasks
        .iter()
        .map(|task| TaskRow {
            name: task.name.clone(),
            task_type: task.task_type.clone().unwrap_or_default(),
            upstream: view
                .relations
                .iter()
                .filter(|relation| relation.to == task.name)
                .map(|relation| relation.from.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect();
    if rows.is_empty() {
        println!("No tasks.");
    } else {
        print_table(rows);
    }

    for sub in &view.sub_workflows {
        let target = sub
            .workflow_id
            .as_ref()
            .map(|id| format!(" ({id})"))
            .unwrap_or_default();
        println!("{} {} -> {}{}", "Sub-workflow:".bold(), sub.task, sub.workflow_name, target);
    }

    for issue in &view.issues {
        let line = format!("warning: {issue}");
        if Cli::should_use_color() {
            println!("{}", line.yellow());
        } else {
            println!("{line}");
        }
    }
    Ok(())
}
