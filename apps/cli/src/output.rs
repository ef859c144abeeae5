//! Output formatting utilities

use crate::OutputFormat;
use console::style;
use mediadl_types::{Task, TaskStatus};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Print output in the specified format
pub fn print_output<T: Serialize + std::fmt::Display>(
    value: &T,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        OutputFormat::Human | OutputFormat::Table => {
            println!("{}", value);
        }
    }
    Ok(())
}

/// Shorten `text` to at most `max` characters
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Whole-percent progress, rounded down
pub fn format_progress(progress: f64) -> String {
    format!("{}%", progress.floor() as u64)
}

/// Print the final task list
pub fn print_tasks(tasks: &[Task], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(tasks)?);
        }
        OutputFormat::Table => {
            #[derive(Tabled)]
            struct TaskRow {
                id: String,
                title: String,
                variant: String,
                size: String,
                progress: String,
                status: String,
                date: String,
            }

            let rows: Vec<TaskRow> = tasks
                .iter()
                .map(|t| TaskRow {
                    id: t.id.to_string()[..8].to_string(),
                    title: truncate(&t.title, 30),
                    variant: t.variant.clone(),
                    size: t.total_size.clone(),
                    progress: format_progress(t.progress),
                    status: t.status.to_string(),
                    date: t.date_label(),
                })
                .collect();

            println!("{}", Table::new(rows));
        }
        OutputFormat::Human => print_grouped(tasks),
    }

    Ok(())
}

/// Active jobs first, then finished ones, each section newest first
fn print_grouped(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("{}", style("No downloads yet").dim());
        return;
    }

    let active: Vec<&Task> = tasks.iter().filter(|t| t.is_active()).collect();
    let completed: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .collect();
    let stopped: Vec<&Task> = tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Cancelled | TaskStatus::Failed))
        .collect();

    for (heading, group) in [
        ("Downloading", &active),
        ("Completed", &completed),
        ("Stopped", &stopped),
    ] {
        if group.is_empty() {
            continue;
        }
        println!();
        println!("{}", style(format!("{} ({})", heading, group.len())).bold());
        for task in group.iter() {
            print_task_line(task);
        }
    }
}

fn print_task_line(task: &Task) {
    let status_icon = match task.status {
        TaskStatus::Completed => style("✓").green(),
        TaskStatus::Downloading => style("↓").cyan(),
        TaskStatus::Failed => style("✗").red(),
        TaskStatus::Cancelled => style("○").dim(),
        TaskStatus::Pending | TaskStatus::Connecting => style("·").dim(),
    };

    let detail = match task.status {
        TaskStatus::Completed => format!("{} · {}", task.total_size, task.date_label()),
        TaskStatus::Downloading => format!(
            "{} · {} | {}",
            format_progress(task.progress),
            task.speed,
            task.total_size
        ),
        _ => format!("{} [{}]", format_progress(task.progress), task.status),
    };

    println!(
        "  {} {} ({}) {}",
        status_icon,
        style(&task.title).bold(),
        task.variant,
        style(detail).dim()
    );
}
