// src/core/coordinator.rs

//! # Coordinator
//!
//! The single owner of one build configuration's project model. It decides which
//! orchestrator operation a request turns into (full setup or incremental configure),
//! holds the re-entrancy guard, injects the kit's machine file and pending option overrides,
//! and applies each new [`ProjectSnapshot`] on its own thread while draining the event channel.

use crate::constants::WATCH_POLL_INTERVAL;
use crate::core::events::{self, Event, EventReceiver, EventSender, Outcome};
use crate::core::introspection;
use crate::core::kit::KitProvider;
use crate::core::orchestrator::{Orchestrator, OrchestratorError, OutputHandler, ParserOutput};
use crate::core::project_tree::ProjectNode;
use crate::core::settings::{BuildConfiguration, ConfigError, Settings};
use crate::core::tasks::SharedTaskSink;
use crate::core::tool_registry::SharedToolRegistry;
use crate::models::{ApplicationTarget, BuildSystemTask, ParseResult};
use crate::system::file_watcher::{self, FileWatcher};
use crate::system::tool_wrapper::is_setup;
use std::sync::Arc;
use std::sync::mpsc::{RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use uuid::Uuid;

const MACHINE_FILE_FLAGS: [&str; 2] = ["--cross-file", "--native-file"];

/// Why a coordinator request could not be started or awaited.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// The re-entrancy guard is held by a cycle still in flight.
    #[error("Another Meson operation is still running; try again once it has finished.")]
    Busy,
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// [`Coordinator::wait_for_outcome`] gave up.
    #[error("No outcome within {0:?}.")]
    Timeout(Duration),
}

/// The model produced by one successful parse. Replaced wholesale, never edited in place.
#[derive(Debug, Clone)]
pub struct ProjectSnapshot {
    pub result: Arc<ParseResult>,
    pub tree: ProjectNode,
    pub target_names: Vec<String>,
}

impl From<ParserOutput> for ProjectSnapshot {
    fn from(output: ParserOutput) -> Self {
        Self {
            result: output.result,
            tree: output.tree,
            target_names: output.target_names,
        }
    }
}

/// Called on the owner's thread after every successful parse.
pub type SnapshotListener = Box<dyn Fn(&ProjectSnapshot) + Send>;

/// Owns one build configuration: its orchestrator, its event channel and its latest snapshot.
pub struct Coordinator {
    config: BuildConfiguration,
    settings: Settings,
    orchestrator: Orchestrator,
    kit: Arc<dyn KitProvider>,
    sink: SharedTaskSink,
    sender: EventSender,
    receiver: EventReceiver,
    busy: bool,
    snapshot: Option<Arc<ProjectSnapshot>>,
    pending_args: Vec<String>,
    /// Set when the running cycle handed `pending_args` to Meson.
    consumed_pending: bool,
    info_baseline: Option<SystemTime>,
    watcher: Option<FileWatcher>,
    listeners: Vec<SnapshotListener>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.config)
            .field("busy", &self.busy)
            .field("orchestrator", &self.orchestrator)
            .field("pending_args", &self.pending_args)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Creates an idle coordinator. The orchestrator inherits the configuration's environment
    /// and the settings' timeout and Ninja verbosity.
    pub fn new(
        config: BuildConfiguration,
        settings: Settings,
        registry: SharedToolRegistry,
        kit: Arc<dyn KitProvider>,
        sink: SharedTaskSink,
    ) -> Self {
        let (sender, receiver) = events::channel();
        let mut orchestrator = Orchestrator::new(registry, sink.clone(), sender.clone());
        orchestrator.set_environment(config.environment.clone());
        orchestrator.set_verbose_ninja(settings.verbose_ninja);
        orchestrator.set_timeout(settings.process_timeout());
        Self {
            config,
            settings,
            orchestrator,
            kit,
            sink,
            sender,
            receiver,
            busy: false,
            snapshot: None,
            pending_args: Vec::new(),
            consumed_pending: false,
            info_baseline: None,
            watcher: None,
            listeners: Vec::new(),
        }
    }

    // --- Accessors ---

    pub fn config(&self) -> &BuildConfiguration {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Only an active configuration re-parses on external changes.
    pub fn set_active(&mut self, active: bool) {
        self.config.active = active;
    }

    pub fn set_tools(&mut self, meson_id: Option<Uuid>, ninja_id: Option<Uuid>) {
        self.orchestrator.set_tools(meson_id, ninja_id);
    }

    pub fn set_output_handler(&mut self, handler: OutputHandler) {
        self.orchestrator.set_output_handler(handler);
    }

    pub fn on_snapshot(&mut self, listener: SnapshotListener) {
        self.listeners.push(listener);
    }

    /// True while a cycle holds the re-entrancy guard.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn snapshot(&self) -> Option<Arc<ProjectSnapshot>> {
        self.snapshot.clone()
    }

    pub fn application_targets(&self) -> Vec<ApplicationTarget> {
        self.snapshot
            .as_ref()
            .map(|s| s.result.application_targets(&self.config.build_dir))
            .unwrap_or_default()
    }

    /// `-D` overrides collected by an option editor.
    ///
    /// They are handed to the next setup, configure or wipe and dropped once that cycle
    /// parses successfully. A plain parse leaves them in place.
    pub fn set_pending_config_args(&mut self, args: Vec<String>) {
        self.pending_args = args;
    }

    pub fn pending_config_args(&self) -> &[String] {
        &self.pending_args
    }

    // --- Policy ---

    /// True when only a full (wiping) setup can bring the build directory up to date.
    pub fn needs_setup(&self) -> bool {
        let build_dir = &self.config.build_dir;
        if !is_setup(build_dir) {
            return true;
        }
        if !self.orchestrator.uses_same_meson_version(build_dir) {
            log::info!("Meson version changed since '{}' was set up.", build_dir.display());
            return true;
        }
        if !self.orchestrator.matches_kit(&self.kit.kit_data()) {
            log::info!("Kit compilers differ from the ones recorded in '{}'.", build_dir.display());
            return true;
        }
        false
    }

    /// Arguments for the running generator cycle; marks the pending overrides as handed over.
    fn take_config_args(&mut self) -> Result<Vec<String>, CoordinatorError> {
        let args = self.config_args()?;
        self.consumed_pending = true;
        Ok(args)
    }

    /// Machine file (unless the user passes one), pending overrides, then the configuration's own args.
    fn config_args(&self) -> Result<Vec<String>, CoordinatorError> {
        let user_args = self.config.meson_config_args()?;
        let has_machine_file = self
            .pending_args
            .iter()
            .chain(user_args.iter())
            .any(|arg| MACHINE_FILE_FLAGS.iter().any(|flag| arg.starts_with(flag)));

        let mut args = Vec::new();
        if !has_machine_file {
            if let Some(machine_file) = self.kit.kit_data().machine_file {
                args.push(format!("--native-file={}", machine_file.display()));
            }
        }
        args.extend(self.pending_args.iter().cloned());
        args.extend(user_args);
        Ok(args)
    }

    // --- Operations ---

    /// Runs `start` under the re-entrancy guard; the guard stays held until the outcome arrives.
    fn guarded<F>(&mut self, start: F) -> Result<(), CoordinatorError>
    where
        F: FnOnce(&mut Self) -> Result<(), CoordinatorError>,
    {
        if self.busy {
            log::debug!("Rejecting request: an operation is already in flight.");
            return Err(CoordinatorError::Busy);
        }
        self.busy = true;
        self.consumed_pending = false;
        let started = start(self);
        if started.is_err() {
            self.busy = false;
        }
        started
    }

    pub fn setup(&mut self) -> Result<(), CoordinatorError> {
        self.guarded(|this| {
            let args = this.take_config_args()?;
            let (src, build) = (this.config.source_dir.clone(), this.config.build_dir.clone());
            Ok(this.orchestrator.setup(&src, &build, &args, false)?)
        })
    }

    /// Incremental configure, or a full setup when [`Self::needs_setup`] says so.
    ///
    /// A build directory that is not set up at all goes through the orchestrator's own
    /// configure, which turns into setup followed by regenerate.
    pub fn configure(&mut self) -> Result<(), CoordinatorError> {
        if self.busy {
            return Err(CoordinatorError::Busy);
        }
        if is_setup(&self.config.build_dir) && self.needs_setup() {
            return self.setup();
        }
        self.guarded(|this| {
            let args = this.take_config_args()?;
            let (src, build) = (this.config.source_dir.clone(), this.config.build_dir.clone());
            Ok(this.orchestrator.configure(&src, &build, &args)?)
        })
    }

    pub fn wipe(&mut self) -> Result<(), CoordinatorError> {
        self.guarded(|this| {
            let args = this.take_config_args()?;
            let (src, build) = (this.config.source_dir.clone(), this.config.build_dir.clone());
            Ok(this.orchestrator.wipe(&src, &build, &args)?)
        })
    }

    /// Refreshes the project model, configuring first if allowed and needed.
    pub fn parse_project(&mut self) -> Result<(), CoordinatorError> {
        if self.busy {
            return Err(CoordinatorError::Busy);
        }
        if !is_setup(&self.config.build_dir) && self.settings.autorun_meson {
            return self.configure();
        }
        self.guarded(|this| {
            let (src, build) = (this.config.source_dir.clone(), this.config.build_dir.clone());
            Ok(this.orchestrator.parse(&src, &build)?)
        })
    }

    pub fn build(&mut self, target: &str) -> Result<(), CoordinatorError> {
        self.guarded(|this| {
            let build = this.config.build_dir.clone();
            Ok(this.orchestrator.compile(&build, target)?)
        })
    }

    // --- Watching ---

    /// Starts polling `meson-info.json`; changes arrive as [`Event::InfoFileChanged`].
    pub fn watch(&mut self) {
        let path = introspection::meson_info_path(&self.config.build_dir);
        let sender = self.sender.clone();
        self.watcher = Some(FileWatcher::spawn(path, WATCH_POLL_INTERVAL, move |modified| {
            let _ = sender.send(Event::InfoFileChanged { modified });
        }));
    }

    pub fn stop_watching(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
    }

    // --- Event loop ---

    /// Applies every event already queued, without blocking.
    pub fn process_events(&mut self) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => outcomes.extend(self.handle_event(event)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return outcomes,
            }
        }
    }

    /// Applies events until one finishes a cycle, or `timeout` elapses.
    pub fn wait_for_outcome(&mut self, timeout: Duration) -> Result<Outcome, CoordinatorError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(event) => {
                    if let Some(outcome) = self.handle_event(event) {
                        return Ok(outcome);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(CoordinatorError::Timeout(timeout));
                }
            }
        }
    }

    pub fn handle_event(&mut self, event: Event) -> Option<Outcome> {
        match event {
            Event::Process(event) => {
                let outcome = self.orchestrator.handle_process_event(event)?;
                Some(self.finish_cycle(outcome))
            }
            Event::ParseFinished(parsed) => {
                let (outcome, output) = self.orchestrator.handle_parse_finished(*parsed);
                if let Some(output) = output {
                    self.snapshot = Some(Arc::new(ProjectSnapshot::from(output)));
                }
                let outcome = self.finish_cycle(outcome);
                if outcome == Outcome::ParsingCompleted(true) {
                    if let Some(snapshot) = &self.snapshot {
                        for listener in &self.listeners {
                            listener(snapshot);
                        }
                    }
                }
                Some(outcome)
            }
            Event::InfoFileChanged { modified } => {
                self.info_file_changed(modified);
                None
            }
        }
    }

    fn finish_cycle(&mut self, outcome: Outcome) -> Outcome {
        match outcome {
            Outcome::ParsingCompleted(true) => {
                if self.consumed_pending {
                    self.pending_args.clear();
                }
                self.info_baseline =
                    file_watcher::modified_time(&introspection::meson_info_path(&self.config.build_dir));
                log::info!("Project model of '{}' updated.", self.config.source_dir.display());
            }
            Outcome::ParsingCompleted(false) => {
                self.sink.add_task(BuildSystemTask::error("Meson build: Parsing failed"));
            }
            Outcome::BuildCompleted(success) => {
                log::info!("Build {}.", if success { "succeeded" } else { "failed" });
            }
        }
        self.busy = false;
        self.consumed_pending = false;
        outcome
    }

    fn info_file_changed(&mut self, modified: SystemTime) {
        if self.busy {
            log::debug!("Ignoring meson-info.json change while busy.");
            return;
        }
        if self.info_baseline.is_some_and(|baseline| modified <= baseline) {
            return;
        }
        if !self.config.active {
            log::debug!("Ignoring meson-info.json change: configuration not active.");
            return;
        }
        log::info!("'{}' changed on disk, re-parsing.", self.config.build_dir.display());
        if let Err(e) = self.parse_project() {
            log::warn!("Re-parse after external change failed to start: {}", e);
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{MESON_INFO, MESON_INFO_DIR, SETUP_MARKER_FILES};
    use crate::core::kit::StaticKit;
    use crate::core::tasks::CollectingTaskSink;
    use crate::core::tool_registry::ToolRegistry;
    use crate::models::KitData;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn coordinator(build: &Path, kit: KitData) -> (Coordinator, Arc<CollectingTaskSink>) {
        let sink = Arc::new(CollectingTaskSink::new());
        let mut config = BuildConfiguration::new("/src", build);
        config.environment.clear();
        let coordinator = Coordinator::new(
            config,
            Settings::default(),
            ToolRegistry::new().into_shared(),
            Arc::new(StaticKit(kit)),
            sink.clone(),
        );
        (coordinator, sink)
    }

    fn set_up(build: &Path) {
        let info = build.join(MESON_INFO_DIR);
        fs::create_dir_all(&info).unwrap();
        for file in SETUP_MARKER_FILES {
            fs::write(info.join(file), "[]").unwrap();
        }
        fs::write(info.join(MESON_INFO), "{}").unwrap();
    }

    #[test]
    fn test_native_file_is_injected_unless_user_passes_one() {
        let build = TempDir::new().unwrap();
        let kit = KitData {
            machine_file: Some(PathBuf::from("/kits/native.ini")),
            ..KitData::default()
        };
        let (mut coordinator, _) = coordinator(build.path(), kit);
        coordinator.set_pending_config_args(vec!["-Dfoo=1".to_string()]);
        assert_eq!(
            coordinator.config_args().unwrap(),
            ["--native-file=/kits/native.ini", "-Dfoo=1", "-Dbuildtype=debug"]
        );

        coordinator.set_pending_config_args(vec!["--cross-file=arm.ini".to_string()]);
        assert_eq!(
            coordinator.config_args().unwrap(),
            ["--cross-file=arm.ini", "-Dbuildtype=debug"]
        );
    }

    #[test]
    fn test_needs_setup_for_fresh_directory() {
        let build = TempDir::new().unwrap();
        let (coordinator, _) = coordinator(build.path(), KitData::default());
        assert!(coordinator.needs_setup());
        set_up(build.path());
        // No meson configured, so its version cannot match what the directory recorded.
        assert!(coordinator.needs_setup());
    }

    #[test]
    fn test_guard_rejects_calls_while_parsing() {
        let build = TempDir::new().unwrap();
        set_up(build.path());
        let (mut coordinator, sink) = coordinator(build.path(), KitData::default());

        coordinator.parse_project().unwrap();
        assert!(coordinator.is_busy());
        assert!(matches!(coordinator.configure(), Err(CoordinatorError::Busy)));
        assert!(matches!(coordinator.build("all"), Err(CoordinatorError::Busy)));
        assert!(matches!(coordinator.parse_project(), Err(CoordinatorError::Busy)));

        let outcome = coordinator.wait_for_outcome(Duration::from_secs(10)).unwrap();
        assert_eq!(outcome, Outcome::ParsingCompleted(true));
        assert!(!coordinator.is_busy());
        assert!(coordinator.snapshot().is_some());
        assert!(sink.errors().is_empty());
    }

    #[test]
    fn test_start_failure_releases_guard() {
        let build = TempDir::new().unwrap();
        let (mut coordinator, _) = coordinator(build.path(), KitData::default());
        assert!(matches!(coordinator.setup(), Err(CoordinatorError::Orchestrator(_))));
        assert!(!coordinator.is_busy());
    }

    #[test]
    fn test_stale_info_file_change_is_ignored() {
        let build = TempDir::new().unwrap();
        set_up(build.path());
        let (mut coordinator, _) = coordinator(build.path(), KitData::default());
        let listened = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = listened.clone();
        coordinator.on_snapshot(Box::new(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));

        coordinator.parse_project().unwrap();
        coordinator.wait_for_outcome(Duration::from_secs(10)).unwrap();
        assert_eq!(listened.load(std::sync::atomic::Ordering::SeqCst), 1);

        coordinator.handle_event(Event::InfoFileChanged {
            modified: SystemTime::UNIX_EPOCH,
        });
        assert!(!coordinator.is_busy());

        coordinator.set_active(false);
        coordinator.handle_event(Event::InfoFileChanged {
            modified: SystemTime::now() + Duration::from_secs(3600),
        });
        assert!(!coordinator.is_busy());

        coordinator.set_active(true);
        coordinator.handle_event(Event::InfoFileChanged {
            modified: SystemTime::now() + Duration::from_secs(3600),
        });
        assert!(coordinator.is_busy());
        coordinator.wait_for_outcome(Duration::from_secs(10)).unwrap();
        assert_eq!(listened.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_plain_parse_keeps_pending_overrides() {
        let build = TempDir::new().unwrap();
        set_up(build.path());
        let (mut coordinator, _) = coordinator(build.path(), KitData::default());
        coordinator.set_pending_config_args(vec!["-Dfoo=1".to_string()]);

        coordinator.parse_project().unwrap();
        assert_eq!(
            coordinator.wait_for_outcome(Duration::from_secs(10)).unwrap(),
            Outcome::ParsingCompleted(true)
        );
        assert_eq!(coordinator.pending_config_args(), ["-Dfoo=1"]);
    }
}
