// src/core/output_parser.rs

use crate::core::paths::absolute_from;
use crate::core::tasks::SharedTaskSink;
use crate::models::{BuildSystemTask, TaskCategory};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref LOCATED_ERROR_RE: Regex = Regex::new(r"(^.*meson\.build):(\d+):(\d+): ERROR").unwrap();
    static ref OPTION_ERROR_RE: Regex = Regex::new(r"ERROR: Value").unwrap();
    static ref NINJA_PROGRESS_RE: Regex = Regex::new(r"^\[(\d+)/(\d+)\]").unwrap();
}

/// Warnings whose details continue on the following lines, with the number of extra lines.
const MULTI_LINE_WARNINGS: [(&str, usize); 3] = [
    ("WARNING: Unknown options:", 2),
    ("WARNING: Project specifies a minimum meson_version", 1),
    ("WARNING: Deprecated features used:", 2),
];

const WARNING_PREFIX: &str = "WARNING:";
const NINJA_FAILED_PREFIX: &str = "FAILED: ";

/// What a single output line turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Error,
    Warning,
    /// Backend progress in percent.
    Progress(u8),
    Plain,
}

#[derive(Debug)]
struct PendingWarning {
    message: String,
    remaining: usize,
}

/// Classifies generator and backend output lines, posting errors and warnings as tasks.
pub struct OutputParser {
    source_dir: PathBuf,
    sink: SharedTaskSink,
    pending: Option<PendingWarning>,
}

impl std::fmt::Debug for OutputParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputParser")
            .field("source_dir", &self.source_dir)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl OutputParser {
    pub fn new(sink: SharedTaskSink) -> Self {
        Self {
            source_dir: PathBuf::new(),
            sink,
            pending: None,
        }
    }

    /// Relative file names in error lines are resolved against this directory.
    pub fn set_source_dir(&mut self, source_dir: &Path) {
        self.source_dir = source_dir.to_path_buf();
    }

    pub fn read_line(&mut self, line: &str) -> LineKind {
        if let Some(mut pending) = self.pending.take() {
            pending.message.push('\n');
            pending.message.push_str(line);
            pending.remaining = pending.remaining.saturating_sub(1);
            if pending.remaining == 0 {
                self.sink.add_task(BuildSystemTask::warning(pending.message));
            } else {
                self.pending = Some(pending);
            }
            return LineKind::Warning;
        }

        if let Some(caps) = LOCATED_ERROR_RE.captures(line) {
            let file = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let line_no = caps.get(2).and_then(|m| m.as_str().parse().ok());
            let file = absolute_from(&self.source_dir, Path::new(file));
            self.sink
                .add_task(BuildSystemTask::error(line).at(file, line_no));
            return LineKind::Error;
        }
        if OPTION_ERROR_RE.is_match(line) {
            self.sink.add_task(BuildSystemTask::error(line));
            return LineKind::Error;
        }
        if line.starts_with(WARNING_PREFIX) {
            let extra_lines = MULTI_LINE_WARNINGS
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix))
                .map(|(_, n)| *n);
            match extra_lines {
                Some(remaining) => {
                    self.pending = Some(PendingWarning {
                        message: line.to_string(),
                        remaining,
                    })
                }
                None => self.sink.add_task(BuildSystemTask::warning(line)),
            }
            return LineKind::Warning;
        }

        if let Some(caps) = NINJA_PROGRESS_RE.captures(line) {
            let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
            if let (Some(done), Some(total)) = (number(1), number(2)) {
                if total > 0 {
                    let percent = u8::try_from(done.min(total) * 100 / total).unwrap_or(100);
                    return LineKind::Progress(percent);
                }
            }
        }
        if line.starts_with(NINJA_FAILED_PREFIX) {
            self.sink
                .add_task(BuildSystemTask::error(line).with_category(TaskCategory::Compile));
            return LineKind::Error;
        }

        LineKind::Plain
    }

    /// Feeds a whole captured buffer, line by line, then flushes.
    pub fn read_all(&mut self, data: &[u8]) {
        for line in String::from_utf8_lossy(data).lines() {
            self.read_line(line);
        }
        self.flush();
    }

    /// Emits a multi-line warning whose continuation lines never arrived.
    pub fn flush(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.sink.add_task(BuildSystemTask::warning(pending.message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tasks::CollectingTaskSink;
    use crate::models::TaskKind;
    use std::sync::Arc;

    fn parser() -> (OutputParser, Arc<CollectingTaskSink>) {
        let sink = Arc::new(CollectingTaskSink::new());
        let mut parser = OutputParser::new(sink.clone());
        parser.set_source_dir(Path::new("/src"));
        (parser, sink)
    }

    #[test]
    fn test_located_error_resolves_file_against_source_dir() {
        let (mut parser, sink) = parser();
        let kind = parser.read_line("sub/meson.build:12:4: ERROR: Unknown variable \"foo\".");
        assert_eq!(kind, LineKind::Error);
        let tasks = sink.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].file, Some(PathBuf::from("/src/sub/meson.build")));
        assert_eq!(tasks[0].line, Some(12));
    }

    #[test]
    fn test_option_value_error() {
        let (mut parser, sink) = parser();
        assert_eq!(
            parser.read_line("ERROR: Value \"maybe\" (of type \"string\") for combo option"),
            LineKind::Error
        );
        assert_eq!(sink.errors().len(), 1);
    }

    #[test]
    fn test_multi_line_warning_is_one_task() {
        let (mut parser, sink) = parser();
        parser.read_line("WARNING: Unknown options: \"foo\"");
        parser.read_line("The following options were not used:");
        assert!(sink.tasks().is_empty());
        parser.read_line("  foo");
        parser.read_line("Build targets in project: 1");

        let tasks = sink.tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, TaskKind::Warning);
        assert_eq!(tasks[0].message.lines().count(), 3);
    }

    #[test]
    fn test_single_line_warning_and_flush() {
        let (mut parser, sink) = parser();
        parser.read_line("WARNING: You should add the boolean check kwarg");
        parser.read_line("WARNING: Deprecated features used:");
        assert_eq!(sink.tasks().len(), 1);
        parser.flush();
        assert_eq!(sink.tasks().len(), 2);
    }

    #[test]
    fn test_ninja_lines() {
        let (mut parser, sink) = parser();
        assert_eq!(parser.read_line("[3/4] Compiling C object app.p/main.c.o"), LineKind::Progress(75));
        assert_eq!(parser.read_line("FAILED: app.p/main.c.o"), LineKind::Error);
        assert_eq!(parser.read_line("ninja: build stopped: subcommand failed."), LineKind::Plain);
        let errors = sink.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].category, TaskCategory::Compile);
    }

    #[test]
    fn test_read_all_handles_captured_stderr() {
        let (mut parser, sink) = parser();
        parser.read_all(b"meson.build:1:0: ERROR: First statement must be a call to project()\n");
        let errors = sink.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file, Some(PathBuf::from("/src/meson.build")));
    }
}
