//! Progress bar utilities for watching tasks

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use mediadl_types::{EngineEvent, Task, TaskStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Manages progress bars for multiple tasks
pub struct TaskProgress {
    multi: MultiProgress,
    bars: Arc<RwLock<HashMap<Uuid, ProgressBar>>>,
}

impl TaskProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a progress bar for a task
    pub async fn add_task(&self, task: &Task) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(100));

        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.bold} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        {
            pb.set_style(bar_style.progress_chars("█▓▒░  "));
        }

        let icon = if task.is_audio() { "♪" } else { "▶" };
        pb.set_prefix(format!("{} {} ({})", icon, crate::output::truncate(&task.title, 28), task.variant));
        pb.set_position(task.progress as u64);
        pb.set_message(status_message(task.status, &task.speed, &task.total_size));

        self.bars.write().await.insert(task.id, pb.clone());
        pb
    }

    /// Update a progress bar from an event
    pub async fn handle_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::TaskAdded { task } => {
                self.add_task(task).await;
            }

            EngineEvent::TaskProgress {
                id,
                progress,
                speed,
            } => {
                let bars = self.bars.read().await;
                if let Some(pb) = bars.get(id) {
                    pb.set_position(*progress as u64);
                    if !speed.is_empty() {
                        pb.set_message(speed.clone());
                    }
                }
            }

            EngineEvent::TaskStatusChanged { id, status } => {
                let bars = self.bars.read().await;
                if let Some(pb) = bars.get(id) {
                    match status {
                        TaskStatus::Completed => {
                            pb.set_position(100);
                            pb.finish_with_message(format!(
                                "{} Complete",
                                style("✓").green().bold()
                            ));
                        }
                        TaskStatus::Failed => {
                            pb.abandon_with_message(format!("{} Failed", style("✗").red().bold()));
                        }
                        TaskStatus::Cancelled => {
                            pb.abandon_with_message(format!("{} Cancelled", style("○").dim()));
                        }
                        TaskStatus::Connecting => {
                            pb.set_message(format!("{}", style("Connecting…").dim()));
                        }
                        TaskStatus::Pending | TaskStatus::Downloading => {}
                    }
                }
            }

            EngineEvent::TaskRemoved { id } => self.remove(*id).await,
        }
    }

    /// Bring every bar in line with a snapshot, e.g. after missing events
    pub async fn sync(&self, tasks: &[Task]) {
        for task in tasks {
            let known = self.bars.read().await.contains_key(&task.id);
            if !known {
                self.add_task(task).await;
            }

            let event = EngineEvent::TaskProgress {
                id: task.id,
                progress: task.progress,
                speed: task.speed.clone(),
            };
            self.handle_event(&event).await;

            if task.is_terminal() {
                let event = EngineEvent::TaskStatusChanged {
                    id: task.id,
                    status: task.status,
                };
                self.handle_event(&event).await;
            }
        }
    }

    /// Remove a progress bar
    pub async fn remove(&self, id: Uuid) {
        if let Some(pb) = self.bars.write().await.remove(&id) {
            pb.finish_and_clear();
        }
    }
}

impl Default for TaskProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn status_message(status: TaskStatus, speed: &str, total_size: &str) -> String {
    match status {
        TaskStatus::Pending => format!("{} | {}", style("Waiting").dim(), total_size),
        TaskStatus::Connecting => format!("{}", style("Connecting…").dim()),
        TaskStatus::Downloading => format!("{} | {}", speed, total_size),
        other => other.to_string(),
    }
}
