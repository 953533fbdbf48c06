// src/core/tasks.rs

use crate::models::{BuildSystemTask, TaskKind};
use colored::Colorize;
use std::sync::{Arc, Mutex};

/// Receives structured error/warning reports (the IDE's "issues" pane, a terminal, a test).
pub trait TaskSink: Send + Sync {
    fn add_task(&self, task: BuildSystemTask);
}

/// Shared handle to a sink, as held by the runner, the orchestrator and the coordinator.
pub type SharedTaskSink = Arc<dyn TaskSink>;

/// Forwards every task to the `log` facade.
#[derive(Debug, Default)]
pub struct LogTaskSink;

impl TaskSink for LogTaskSink {
    fn add_task(&self, task: BuildSystemTask) {
        let location = format_location(&task);
        match task.kind {
            TaskKind::Error => log::error!("{}{}", location, task.message),
            TaskKind::Warning => log::warn!("{}{}", location, task.message),
        }
    }
}

/// Prints tasks to stderr with colors; used by the CLI.
#[derive(Debug, Default)]
pub struct TerminalTaskSink;

impl TaskSink for TerminalTaskSink {
    fn add_task(&self, task: BuildSystemTask) {
        let location = format_location(&task);
        let label = match task.kind {
            TaskKind::Error => "error".red().bold(),
            TaskKind::Warning => "warning".yellow().bold(),
        };
        eprintln!("{}: {}{}", label, location.dimmed(), task.message);
    }
}

/// Keeps every task in memory.
#[derive(Debug, Default)]
pub struct CollectingTaskSink {
    tasks: Mutex<Vec<BuildSystemTask>>,
}

impl CollectingTaskSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<BuildSystemTask> {
        self.tasks
            .lock()
            .map(|tasks| tasks.clone())
            .unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<BuildSystemTask> {
        self.tasks()
            .into_iter()
            .filter(|t| t.kind == TaskKind::Error)
            .collect()
    }
}

impl TaskSink for CollectingTaskSink {
    fn add_task(&self, task: BuildSystemTask) {
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.push(task),
            Err(poisoned) => poisoned.into_inner().push(task),
        }
    }
}

fn format_location(task: &BuildSystemTask) -> String {
    match (&task.file, task.line) {
        (Some(file), Some(line)) => format!("{}:{}: ", file.display(), line),
        (Some(file), None) => format!("{}: ", file.display()),
        _ => String::new(),
    }
}
