// src/system/executor.rs

use crate::constants::{DEFAULT_PROCESS_TIMEOUT, PROCESS_POLL_INTERVAL};
use crate::core::tasks::SharedTaskSink;
use crate::models::{BuildSystemTask, TaskCategory};
use crate::system::command::Command;
use scopeguard::ScopeGuard;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command as StdCommand, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Environment variables handed to spawned processes.
pub type Environment = HashMap<String, String>;

/// Receives everything a running process produces, from the supervisor threads.
pub type ProcessCallback = Arc<dyn Fn(ProcessEvent) + Send + Sync>;

/// How long the supervisor waits for the output pipes to close once the child is gone.
///
/// A grandchild that inherited the pipes can keep them open past the child's exit.
const READER_GRACE: Duration = Duration::from_millis(500);

type OutputBuffer = Arc<Mutex<Vec<u8>>>;

/// Reasons a command is refused before anything is spawned.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Executable does not exist: {}", .0.display())]
    ExecutableMissing(PathBuf),
    #[error("Command is not executable: {}", .0.display())]
    NotExecutable(PathBuf),
    #[error("Cannot start '{0}': another process is still running.")]
    AlreadyRunning(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// How a process ended, independently of its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Normal,
    Crashed,
}

/// Why a process did not get to report a normal exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    FailedToStart(String),
    Crashed,
    TimedOut(Duration),
    WaitFailed(String),
}

/// Everything known about a run once it is over.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub command: Command,
    /// `-1` when the process had no exit code.
    pub exit_code: i32,
    pub exit_status: ExitStatus,
    /// Only filled when the run captured stdout.
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
    pub failure: Option<FailureReason>,
}

impl ProcessOutcome {
    fn failed(command: Command, reason: FailureReason, elapsed: Duration) -> Self {
        Self {
            command,
            exit_code: -1,
            exit_status: ExitStatus::Crashed,
            stdout: Vec::new(),
            stderr: Vec::new(),
            elapsed,
            failure: Some(reason),
        }
    }

    /// Exit code zero, a normal exit, and no supervisor-side failure.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && self.exit_status == ExitStatus::Normal && self.failure.is_none()
    }

    /// The message reported to the task sink for an unsuccessful run.
    pub fn failure_message(&self) -> Option<String> {
        let command = self.command.to_user_output();
        match &self.failure {
            Some(FailureReason::FailedToStart(err)) => Some(format!(
                "The process failed to start. Either the invoked program \"{}\" is missing, or you may have insufficient permissions to invoke the program ({}).",
                self.command.executable().display(),
                err
            )),
            Some(FailureReason::Crashed) => Some(format!("The process was ended forcefully: {}", command)),
            Some(FailureReason::TimedOut(limit)) => Some(format!(
                "The process is not responding after {}s and was killed: {}",
                limit.as_secs(),
                command
            )),
            Some(FailureReason::WaitFailed(err)) => {
                Some(format!("Lost track of the process ({}): {}", err, command))
            }
            None if self.exit_code != 0 => Some(format!(
                "Command '{}' exited with code {}.",
                command, self.exit_code
            )),
            None => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// One line of streamed output (not emitted when stdout is captured).
    Output { stream: OutputStream, line: String },
    /// Always delivered exactly once per successfully started run.
    Finished(ProcessOutcome),
}

/// Runs one external command at a time without blocking the caller.
///
/// Progress is reported through the [`ProcessCallback`]; the owner hands the final
/// [`ProcessEvent::Finished`] back to [`ProcessRunner::finish`] on its own thread.
pub struct ProcessRunner {
    callback: ProcessCallback,
    sink: SharedTaskSink,
    timeout: Duration,
    running: Option<Command>,
}

impl std::fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("timeout", &self.timeout)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl ProcessRunner {
    /// Creates a runner with the default timeout. Start failures and unsuccessful runs
    /// are posted to `sink`.
    pub fn new(callback: ProcessCallback, sink: SharedTaskSink) -> Self {
        Self {
            callback,
            sink,
            timeout: DEFAULT_PROCESS_TIMEOUT,
            running: None,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Starts `command`. Returns once the process is spawned; completion arrives via the callback.
    ///
    /// # Errors
    /// Fails synchronously, after posting a task, if the executable is missing or not
    /// executable, or if a previous run has not been finished yet.
    pub fn run(&mut self, command: &Command, env: &Environment, capture_stdout: bool) -> Result<(), ExecutionError> {
        if let Some(current) = &self.running {
            return Err(ExecutionError::AlreadyRunning(current.to_user_output()));
        }
        if let Err(e) = sanity_check(command) {
            self.sink.add_task(BuildSystemTask::error(e.to_string()));
            return Err(e);
        }

        log::info!(
            "Running {} in {}.",
            command.to_user_output(),
            command.work_dir().display()
        );
        self.running = Some(command.clone());

        let spawned = StdCommand::new(command.executable())
            .args(command.args())
            .current_dir(dunce::simplified(command.work_dir()))
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        match spawned {
            Ok(child) => {
                let callback = self.callback.clone();
                let command = command.clone();
                let timeout = self.timeout;
                thread::spawn(move || supervise(child, command, capture_stdout, timeout, callback));
            }
            Err(e) => {
                // Completion is still reported asynchronously, like any other failed run.
                (self.callback)(ProcessEvent::Finished(ProcessOutcome::failed(
                    command.clone(),
                    FailureReason::FailedToStart(e.to_string()),
                    Duration::ZERO,
                )));
            }
        }
        Ok(())
    }

    /// Records a finished run, posting a task to the sink if it failed.
    pub fn finish(&mut self, outcome: ProcessOutcome) -> ProcessOutcome {
        self.running = None;
        if let Some(message) = outcome.failure_message() {
            self.sink.add_task(
                BuildSystemTask::error(message).with_category(task_category(&outcome.command)),
            );
        }
        log::debug!(
            "'{}' finished in {:.2}s with code {} ({:?}).",
            outcome.command.to_user_output(),
            outcome.elapsed.as_secs_f64(),
            outcome.exit_code,
            outcome.exit_status
        );
        outcome
    }
}

/// Generator invocations start with a Meson subcommand; anything else is a backend build.
fn task_category(command: &Command) -> TaskCategory {
    const GENERATOR_COMMANDS: [&str; 4] = ["setup", "configure", "introspect", "--internal"];
    match command.args().first() {
        Some(first) if GENERATOR_COMMANDS.contains(&first.as_str()) => TaskCategory::BuildSystem,
        _ => TaskCategory::Compile,
    }
}

/// Pre-flight check: the executable must exist and be executable.
pub fn sanity_check(command: &Command) -> Result<(), ExecutionError> {
    let exe = command.executable();
    if !exe.exists() {
        return Err(ExecutionError::ExecutableMissing(exe.to_path_buf()));
    }
    if !is_executable(exe) {
        return Err(ExecutionError::NotExecutable(exe.to_path_buf()));
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Waits for `child` (polling, with a deadline) and reports its outcome through `callback`.
fn supervise(
    mut child: Child,
    command: Command,
    capture_stdout: bool,
    timeout: Duration,
    callback: ProcessCallback,
) {
    let started = Instant::now();

    // If anything below unwinds, the owner still gets its completion event.
    let crash_guard = scopeguard::guard((callback.clone(), command.clone()), move |(callback, command)| {
        callback(ProcessEvent::Finished(ProcessOutcome::failed(
            command,
            FailureReason::Crashed,
            started.elapsed(),
        )));
    });

    let (done_tx, done_rx) = mpsc::channel();
    let stdout_buffer = OutputBuffer::default();
    let stderr_buffer = OutputBuffer::default();
    let mut readers = 0;
    if let Some(pipe) = child.stdout.take() {
        spawn_reader(
            pipe,
            OutputStream::Stdout,
            !capture_stdout,
            capture_stdout.then(|| stdout_buffer.clone()),
            callback.clone(),
            done_tx.clone(),
        );
        readers += 1;
    }
    if let Some(pipe) = child.stderr.take() {
        spawn_reader(
            pipe,
            OutputStream::Stderr,
            !capture_stdout,
            Some(stderr_buffer.clone()),
            callback.clone(),
            done_tx,
        );
        readers += 1;
    }

    let mut failure = None;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if started.elapsed() >= timeout {
                    log::warn!(
                        "'{}' exceeded {}s, killing it (PID: {}).",
                        command.to_user_output(),
                        timeout.as_secs(),
                        child.id()
                    );
                    if let Err(e) = child.kill() {
                        log::warn!("Failed to kill child process {}: {}", child.id(), e);
                    }
                    child.wait().ok();
                    failure = Some(FailureReason::TimedOut(timeout));
                    break None;
                }
                thread::sleep(PROCESS_POLL_INTERVAL);
            }
            Err(e) => {
                child.kill().ok();
                failure = Some(FailureReason::WaitFailed(e.to_string()));
                break None;
            }
        }
    };

    // A killed run gets a short grace period; a normal exit may use what is left of the timeout.
    let drain_deadline = if failure.is_some() {
        Instant::now() + READER_GRACE
    } else {
        (started + timeout).max(Instant::now() + READER_GRACE)
    };
    wait_for_readers(&done_rx, readers, drain_deadline, &command);
    let stdout = take_buffer(&stdout_buffer);
    let stderr = take_buffer(&stderr_buffer);

    let (exit_code, exit_status) = match status.and_then(|s| s.code()) {
        Some(code) => (code, ExitStatus::Normal),
        None => {
            // No exit code: killed by a signal, or we gave up on it above.
            if failure.is_none() {
                failure = Some(FailureReason::Crashed);
            }
            (-1, ExitStatus::Crashed)
        }
    };

    let outcome = ProcessOutcome {
        command,
        exit_code,
        exit_status,
        stdout,
        stderr,
        elapsed: started.elapsed(),
        failure,
    };
    let (callback, _) = ScopeGuard::into_inner(crash_guard);
    callback(ProcessEvent::Finished(outcome));
}

/// Blocks until `readers` reader threads reported completion, or `deadline` passes.
///
/// Readers still running at the deadline are abandoned; their pipes close with the last
/// process holding them.
fn wait_for_readers(done: &Receiver<OutputStream>, readers: usize, deadline: Instant, command: &Command) {
    for _ in 0..readers {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if done.recv_timeout(remaining).is_err() {
            log::warn!(
                "Output of '{}' is still held open by another process; not waiting for it.",
                command.to_user_output()
            );
            return;
        }
    }
}

fn take_buffer(buffer: &OutputBuffer) -> Vec<u8> {
    let mut bytes = buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    std::mem::take(&mut *bytes)
}

/// Drains one pipe on its own thread, optionally streaming lines and/or keeping the bytes.
fn spawn_reader<R: Read + Send + 'static>(
    pipe: R,
    stream: OutputStream,
    stream_lines: bool,
    keep: Option<OutputBuffer>,
    callback: ProcessCallback,
    done: Sender<OutputStream>,
) {
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if let Some(buffer) = &keep {
                        buffer
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .extend_from_slice(&line);
                    }
                    if stream_lines {
                        let text = String::from_utf8_lossy(&line);
                        let text = text.trim_end_matches(['\n', '\r']);
                        log::trace!("[{:?}] {}", stream, text);
                        callback(ProcessEvent::Output {
                            stream,
                            line: text.to_string(),
                        });
                    }
                }
                Err(e) => {
                    log::debug!("Stopped reading {:?}: {}", stream, e);
                    break;
                }
            }
        }
        // The supervisor may have stopped listening already.
        let _ = done.send(stream);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tasks::CollectingTaskSink;
    use std::sync::Mutex;
    use std::sync::mpsc;

    fn runner_with_channel() -> (ProcessRunner, mpsc::Receiver<ProcessEvent>, Arc<CollectingTaskSink>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let callback: ProcessCallback = Arc::new(move |event| {
            if let Ok(tx) = tx.lock() {
                let _ = tx.send(event);
            }
        });
        let sink = Arc::new(CollectingTaskSink::new());
        (ProcessRunner::new(callback, sink.clone()), rx, sink)
    }

    fn wait_finished(rx: &mpsc::Receiver<ProcessEvent>) -> (Vec<String>, ProcessOutcome) {
        let mut lines = Vec::new();
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                ProcessEvent::Output { line, .. } => lines.push(line),
                ProcessEvent::Finished(outcome) => return (lines, outcome),
            }
        }
    }

    #[test]
    fn test_missing_executable_is_rejected_before_spawning() {
        let (mut runner, rx, sink) = runner_with_channel();
        let cmd = Command::new("/no/such/meson", "/", vec![]);
        let result = runner.run(&cmd, &Environment::new(), false);
        assert_eq!(result, Err(ExecutionError::ExecutableMissing(PathBuf::from("/no/such/meson"))));
        assert_eq!(sink.errors().len(), 1);
        assert!(!runner.is_running());
        assert!(rx.try_recv().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let (mut runner, _rx, sink) = runner_with_channel();
        let cmd = Command::new(file.path(), "/", vec![]);
        assert!(matches!(
            runner.run(&cmd, &Environment::new(), false),
            Err(ExecutionError::NotExecutable(_))
        ));
        assert_eq!(sink.errors().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_streams_lines_and_reports_exit_code() {
        let (mut runner, rx, sink) = runner_with_channel();
        let cmd = Command::new(
            "/bin/sh",
            "/",
            vec!["-c".to_string(), "echo one; echo two 1>&2; exit 3".to_string()],
        );
        runner.run(&cmd, &Environment::new(), false).unwrap();
        assert!(runner.is_running());

        let (lines, outcome) = wait_finished(&rx);
        let outcome = runner.finish(outcome);
        assert!(lines.contains(&"one".to_string()));
        assert!(lines.contains(&"two".to_string()));
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.exit_status, ExitStatus::Normal);
        assert!(!outcome.succeeded());
        assert!(!runner.is_running());
        assert_eq!(sink.errors().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_captured_stdout_is_not_streamed() {
        let (mut runner, rx, sink) = runner_with_channel();
        let cmd = Command::new("/bin/sh", "/", vec!["-c".to_string(), "printf '{\"a\": 1}'".to_string()]);
        runner.run(&cmd, &Environment::new(), true).unwrap();
        let (lines, outcome) = wait_finished(&rx);
        let outcome = runner.finish(outcome);
        assert!(lines.is_empty());
        assert!(outcome.succeeded());
        assert_eq!(outcome.stdout, b"{\"a\": 1}");
        assert!(sink.tasks().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_the_process() {
        let (mut runner, rx, _sink) = runner_with_channel();
        runner.set_timeout(Duration::from_millis(200));
        let cmd = Command::new("/bin/sh", "/", vec!["-c".to_string(), "exec sleep 30".to_string()]);
        runner.run(&cmd, &Environment::new(), false).unwrap();
        let (_, outcome) = wait_finished(&rx);
        assert_eq!(outcome.failure, Some(FailureReason::TimedOut(Duration::from_millis(200))));
        assert_eq!(outcome.exit_status, ExitStatus::Crashed);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_is_not_held_up_by_grandchild_keeping_pipes_open() {
        let (mut runner, rx, sink) = runner_with_channel();
        runner.set_timeout(Duration::from_millis(200));
        // Without `exec`, `sleep` outlives the killed shell and keeps stdout open.
        let cmd = Command::new("/bin/sh", "/", vec!["-c".to_string(), "echo early; sleep 8; echo late".to_string()]);
        let started = Instant::now();
        runner.run(&cmd, &Environment::new(), true).unwrap();

        let (_, outcome) = wait_finished(&rx);
        assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
        assert_eq!(outcome.failure, Some(FailureReason::TimedOut(Duration::from_millis(200))));
        assert_eq!(outcome.stdout, b"early\n");

        let outcome = runner.finish(outcome);
        assert!(!outcome.succeeded());
        assert!(!runner.is_running());
        assert_eq!(sink.errors().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_second_run_while_busy_is_refused() {
        let (mut runner, rx, _sink) = runner_with_channel();
        let cmd = Command::new("/bin/sh", "/", vec!["-c".to_string(), "sleep 0.2".to_string()]);
        runner.run(&cmd, &Environment::new(), false).unwrap();
        assert!(matches!(
            runner.run(&cmd, &Environment::new(), false),
            Err(ExecutionError::AlreadyRunning(_))
        ));
        let (_, outcome) = wait_finished(&rx);
        assert!(runner.finish(outcome).succeeded());
    }
}
