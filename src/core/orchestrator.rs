// src/core/orchestrator.rs

//! # Orchestrator
//!
//! Sequences generator and backend runs for one source/build directory pair.
//!
//! At most one process runs at a time. Follow-up commands (the `regenerate` that must run
//! after every `configure`) wait in a FIFO queue and are started only once their predecessor
//! finished successfully. When the queue drains, the introspection output is parsed on the
//! rayon pool and the result comes back through the event channel as
//! [`Event::ParseFinished`], which the owner hands to [`Orchestrator::handle_parse_finished`].
//!
//! The orchestrator never blocks: every operation returns as soon as the first process is
//! spawned, and all progress happens in [`Orchestrator::handle_process_event`].

use crate::constants::BUILTIN_BUILD_TARGETS;
use crate::core::events::{self, Event, EventSender, Outcome};
use crate::core::introspection::{self, IntrospectionError};
use crate::core::output_parser::{LineKind, OutputParser};
use crate::core::project_tree::{self, ProjectNode};
use crate::core::tasks::SharedTaskSink;
use crate::core::tool_registry::SharedToolRegistry;
use crate::models::{BuildSystemTask, KitData, ParseResult};
use crate::system::command::Command;
use crate::system::executor::{Environment, ExecutionError, ProcessEvent, ProcessOutcome, ProcessRunner};
use crate::system::tool_wrapper::{ToolError, ToolKind, ToolWrapper, is_setup};
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Why an operation could not be started.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// An earlier operation has not finished yet.
    #[error("Another operation is in progress ({0}).")]
    Busy(State),
    /// The registry holds no tool of the required kind.
    #[error("No {0} executable is configured.")]
    MissingTool(ToolKind),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// The user-level operation a running process belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Setup,
    Configure,
    Wipe,
    Introspect,
    Compile,
}

/// Lifecycle of one orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Ready to accept an operation.
    Idle,
    /// A process of this operation is running, possibly with more queued behind it.
    Running(OperationKind),
    /// The worker is turning introspection data into a model.
    ParsingResult,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Running(kind) => write!(f, "running {:?}", kind),
            Self::ParsingResult => f.write_str("parsing introspection data"),
        }
    }
}

/// Where the next parse reads its JSON from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntroSource {
    Files,
    Stdout,
}

#[derive(Debug)]
struct PendingCommand {
    command: Command,
    capture_stdout: bool,
    kind: OperationKind,
}

/// What the parse worker hands back: the new model, ready to be applied.
#[derive(Debug, Clone)]
pub struct ParserOutput {
    pub result: Arc<ParseResult>,
    pub tree: ProjectNode,
    /// Full names of all targets plus the backend's built-in targets, sorted.
    pub target_names: Vec<String>,
}

/// Receives every streamed output line, e.g. to echo it to a terminal.
pub type OutputHandler = Box<dyn Fn(&str) + Send>;

/// The state machine driving Meson and Ninja for one source/build directory pair.
pub struct Orchestrator {
    state: State,
    queue: VecDeque<PendingCommand>,
    runner: ProcessRunner,
    output_parser: OutputParser,
    sink: SharedTaskSink,
    sender: EventSender,
    registry: SharedToolRegistry,
    meson_id: Option<Uuid>,
    ninja_id: Option<Uuid>,
    source_dir: PathBuf,
    build_dir: PathBuf,
    environment: Environment,
    intro_source: IntroSource,
    verbose_ninja: bool,
    result: Option<Arc<ParseResult>>,
    target_names: Vec<String>,
    output_handler: Option<OutputHandler>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state)
            .field("queue", &self.queue)
            .field("source_dir", &self.source_dir)
            .field("build_dir", &self.build_dir)
            .field("intro_source", &self.intro_source)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an idle orchestrator. Process events and parse results are posted to `sender`;
    /// tasks (errors and warnings) go to `sink`.
    pub fn new(registry: SharedToolRegistry, sink: SharedTaskSink, sender: EventSender) -> Self {
        Self {
            state: State::Idle,
            queue: VecDeque::new(),
            runner: ProcessRunner::new(events::process_callback(&sender), sink.clone()),
            output_parser: OutputParser::new(sink.clone()),
            sink,
            sender,
            registry,
            meson_id: None,
            ninja_id: None,
            source_dir: PathBuf::new(),
            build_dir: PathBuf::new(),
            environment: Environment::new(),
            intro_source: IntroSource::Files,
            verbose_ninja: false,
            result: None,
            target_names: Vec::new(),
            output_handler: None,
        }
    }

    // --- Configuration ---

    /// Pins specific registry entries; `None` means the registry's default for that kind.
    pub fn set_tools(&mut self, meson_id: Option<Uuid>, ninja_id: Option<Uuid>) {
        self.meson_id = meson_id;
        self.ninja_id = ninja_id;
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = environment;
    }

    pub fn set_verbose_ninja(&mut self, verbose: bool) {
        self.verbose_ninja = verbose;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.runner.set_timeout(timeout);
    }

    /// Receives every streamed output line of generator and backend runs.
    pub fn set_output_handler(&mut self, handler: OutputHandler) {
        self.output_handler = Some(handler);
    }

    // --- Queries ---

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    pub fn parse_result(&self) -> Option<Arc<ParseResult>> {
        self.result.clone()
    }

    pub fn target_names(&self) -> &[String] {
        &self.target_names
    }

    pub fn meson(&self) -> Option<ToolWrapper> {
        self.tool(ToolKind::Meson)
    }

    pub fn ninja(&self) -> Option<ToolWrapper> {
        self.tool(ToolKind::Ninja)
    }

    fn tool(&self, kind: ToolKind) -> Option<ToolWrapper> {
        let registry = match self.registry.read() {
            Ok(registry) => registry,
            Err(poisoned) => poisoned.into_inner(),
        };
        match kind {
            ToolKind::Meson => registry.meson(self.meson_id).cloned(),
            ToolKind::Ninja => registry.ninja(self.ninja_id).cloned(),
        }
    }

    fn require_tool(&self, kind: ToolKind) -> Result<ToolWrapper, OrchestratorError> {
        self.tool(kind).ok_or_else(|| {
            let err = OrchestratorError::MissingTool(kind);
            self.sink.add_task(BuildSystemTask::error(err.to_string()));
            err
        })
    }

    /// True if the Meson that last wrote `build_dir` is the one configured now.
    pub fn uses_same_meson_version(&self, build_dir: &Path) -> bool {
        let recorded = introspection::read_meson_info(build_dir);
        let Some(meson) = self.meson() else {
            return false;
        };
        let same = recorded.is_valid && meson.version() == recorded;
        if !same {
            log::debug!(
                "Meson version changed: build dir has {}, tool is {}.",
                recorded,
                meson.version()
            );
        }
        same
    }

    /// True if every C/C++ compiler recorded by the last parse is the kit's compiler.
    ///
    /// Without a parse result there is nothing to compare, so the kit matches.
    pub fn matches_kit(&self, kit: &KitData) -> bool {
        let Some(result) = &self.result else {
            return true;
        };
        result.targets.iter().flat_map(|t| t.sources.iter()).all(|group| {
            let expected = match group.language.as_str() {
                "c" => kit.c_compiler_path.as_deref(),
                "cpp" => kit.cxx_compiler_path.as_deref(),
                _ => None,
            };
            match (expected, group.compiler_path()) {
                (Some(expected), Some(recorded)) => same_executable(expected, recorded),
                _ => true,
            }
        })
    }

    // --- Operations ---

    fn ensure_idle(&self) -> Result<(), OrchestratorError> {
        if self.state == State::Idle {
            Ok(())
        } else {
            Err(OrchestratorError::Busy(self.state))
        }
    }

    fn begin(&mut self, source_dir: &Path, build_dir: &Path, intro_source: IntroSource) {
        self.queue.clear();
        self.source_dir = source_dir.to_path_buf();
        self.build_dir = build_dir.to_path_buf();
        self.intro_source = intro_source;
        self.output_parser.set_source_dir(source_dir);
    }

    /// `meson setup`, adding `--wipe` when forced or when the directory is already set up.
    pub fn setup(&mut self, source_dir: &Path, build_dir: &Path, args: &[String], force_wipe: bool) -> Result<(), OrchestratorError> {
        let kind = if force_wipe { OperationKind::Wipe } else { OperationKind::Setup };
        self.start_setup(source_dir, build_dir, args, force_wipe, kind, false)
    }

    pub fn wipe(&mut self, source_dir: &Path, build_dir: &Path, args: &[String]) -> Result<(), OrchestratorError> {
        self.setup(source_dir, build_dir, args, true)
    }

    /// `meson configure` followed by a regenerate, or a setup if the directory is not set up.
    pub fn configure(&mut self, source_dir: &Path, build_dir: &Path, args: &[String]) -> Result<(), OrchestratorError> {
        if !is_setup(build_dir) {
            log::debug!("'{}' is not set up, configuring through setup.", build_dir.display());
            return self.start_setup(source_dir, build_dir, args, false, OperationKind::Setup, true);
        }
        self.ensure_idle()?;
        let meson = self.require_tool(ToolKind::Meson)?;
        self.begin(source_dir, build_dir, IntroSource::Files);

        let configure = meson.configure(source_dir, build_dir, args)?;
        let regenerate = meson.regenerate(source_dir, build_dir)?;
        self.queue.push_back(PendingCommand {
            command: regenerate,
            capture_stdout: false,
            kind: OperationKind::Configure,
        });
        self.run(PendingCommand {
            command: configure,
            capture_stdout: false,
            kind: OperationKind::Configure,
        })
    }

    fn start_setup(
        &mut self,
        source_dir: &Path,
        build_dir: &Path,
        args: &[String],
        force_wipe: bool,
        kind: OperationKind,
        then_regenerate: bool,
    ) -> Result<(), OrchestratorError> {
        self.ensure_idle()?;
        let meson = self.require_tool(ToolKind::Meson)?;
        self.begin(source_dir, build_dir, IntroSource::Files);

        let mut options = args.to_vec();
        if force_wipe || is_setup(build_dir) {
            options.push("--wipe".to_string());
        }
        let setup = meson.setup(source_dir, build_dir, &options)?;
        if then_regenerate {
            self.queue.push_back(PendingCommand {
                command: meson.regenerate(source_dir, build_dir)?,
                capture_stdout: false,
                kind,
            });
        }
        self.run(PendingCommand {
            command: setup,
            capture_stdout: false,
            kind,
        })
    }

    /// Loads the project model: from `meson-info/` if set up, else from `meson introspect`.
    pub fn parse(&mut self, source_dir: &Path, build_dir: &Path) -> Result<(), OrchestratorError> {
        self.ensure_idle()?;
        if is_setup(build_dir) {
            self.begin(source_dir, build_dir, IntroSource::Files);
            self.start_parser(Vec::new());
            return Ok(());
        }

        let meson = self.require_tool(ToolKind::Meson)?;
        self.begin(source_dir, build_dir, IntroSource::Stdout);
        let introspect = meson.introspect(source_dir)?;
        self.run(PendingCommand {
            command: introspect,
            capture_stdout: true,
            kind: OperationKind::Introspect,
        })
    }

    /// Builds `target` with the backend.
    pub fn compile(&mut self, build_dir: &Path, target: &str) -> Result<(), OrchestratorError> {
        self.ensure_idle()?;
        let ninja = self.require_tool(ToolKind::Ninja)?;
        let source_dir = self.source_dir.clone();
        self.begin(&source_dir, build_dir, IntroSource::Files);
        let command = ninja.compile(build_dir, target, self.verbose_ninja)?;
        self.run(PendingCommand {
            command,
            capture_stdout: false,
            kind: OperationKind::Compile,
        })
    }

    fn run(&mut self, pending: PendingCommand) -> Result<(), OrchestratorError> {
        log::debug!("State: {} -> running {:?}.", self.state, pending.kind);
        self.state = State::Running(pending.kind);
        if let Err(e) = self
            .runner
            .run(&pending.command, &self.environment, pending.capture_stdout)
        {
            self.queue.clear();
            self.state = State::Idle;
            return Err(e.into());
        }
        Ok(())
    }

    // --- Event handling ---

    /// Applies one runner event. Returns an outcome when the cycle ended.
    pub fn handle_process_event(&mut self, event: ProcessEvent) -> Option<Outcome> {
        match event {
            ProcessEvent::Output { line, .. } => {
                if let LineKind::Progress(percent) = self.output_parser.read_line(&line) {
                    log::debug!("Build progress: {}%", percent);
                }
                if let Some(handler) = &self.output_handler {
                    handler(&line);
                }
                None
            }
            ProcessEvent::Finished(outcome) => self.process_finished(outcome),
        }
    }

    fn process_finished(&mut self, outcome: ProcessOutcome) -> Option<Outcome> {
        let State::Running(kind) = self.state else {
            log::warn!("Ignoring completion of '{}' while {}.", outcome.command, self.state);
            return None;
        };
        let outcome = self.runner.finish(outcome);
        self.output_parser.flush();

        if !outcome.succeeded() {
            self.queue.clear();
            self.state = State::Idle;
            if self.intro_source == IntroSource::Stdout && kind == OperationKind::Introspect {
                self.output_parser.read_all(&outcome.stderr);
            }
            log::debug!("{:?} failed; state back to idle.", kind);
            return Some(Self::failure_outcome(kind));
        }

        if let Some(next) = self.queue.pop_front() {
            log::debug!("Starting queued '{}'.", next.command);
            let next_kind = next.kind;
            return match self.run(next) {
                Ok(()) => None,
                Err(_) => Some(Self::failure_outcome(next_kind)),
            };
        }

        if kind == OperationKind::Compile {
            self.state = State::Idle;
            return Some(Outcome::BuildCompleted(true));
        }
        self.start_parser(outcome.stdout);
        None
    }

    fn failure_outcome(kind: OperationKind) -> Outcome {
        match kind {
            OperationKind::Compile => Outcome::BuildCompleted(false),
            _ => Outcome::ParsingCompleted(false),
        }
    }

    fn start_parser(&mut self, stdout: Vec<u8>) {
        log::debug!("State: {} -> parsing ({:?}).", self.state, self.intro_source);
        self.state = State::ParsingResult;
        let source = self.intro_source;
        let source_dir = self.source_dir.clone();
        let build_dir = self.build_dir.clone();
        let sender = self.sender.clone();
        rayon::spawn(move || {
            let parsed = extract(source, &stdout, &source_dir, &build_dir);
            let _ = sender.send(Event::ParseFinished(Box::new(parsed)));
        });
    }

    /// Applies the worker's result. A failed parse keeps the previous result.
    pub fn handle_parse_finished(
        &mut self,
        parsed: Result<ParserOutput, IntrospectionError>,
    ) -> (Outcome, Option<ParserOutput>) {
        self.state = State::Idle;
        match parsed {
            Ok(output) => {
                log::debug!(
                    "Parsed {} targets and {} options.",
                    output.result.targets.len(),
                    output.result.build_options.len()
                );
                self.result = Some(output.result.clone());
                self.target_names = output.target_names.clone();
                (Outcome::ParsingCompleted(true), Some(output))
            }
            Err(e) => {
                self.sink
                    .add_task(BuildSystemTask::error(format!("Failed to parse introspection data: {}", e)));
                (Outcome::ParsingCompleted(false), None)
            }
        }
    }
}

/// The parse worker body: JSON to model, then model to tree.
fn extract(
    source: IntroSource,
    stdout: &[u8],
    source_dir: &Path,
    build_dir: &Path,
) -> Result<ParserOutput, IntrospectionError> {
    let result = match source {
        IntroSource::Files => introspection::parse_build_dir(build_dir),
        IntroSource::Stdout => introspection::parse_document(stdout)?,
    };
    let tree = project_tree::build_project_tree(
        source_dir,
        build_dir,
        &result.targets,
        &result.build_system_files,
    );
    let target_names = build_target_names(&result, build_dir);
    Ok(ParserOutput {
        result: Arc::new(result),
        tree,
        target_names,
    })
}

fn build_target_names(result: &ParseResult, build_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = result
        .targets
        .iter()
        .map(|t| t.full_name(build_dir))
        .chain(BUILTIN_BUILD_TARGETS.iter().map(|t| t.to_string()))
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Compares a kit compiler with one recorded by Meson, which may be a bare program name.
fn same_executable(expected: &Path, recorded: &str) -> bool {
    let recorded = Path::new(recorded);
    let recorded = if recorded.components().count() == 1 {
        which::which(recorded).unwrap_or_else(|_| recorded.to_path_buf())
    } else {
        recorded.to_path_buf()
    };
    let canonical = |p: &Path| dunce::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    canonical(expected) == canonical(&recorded)
}
