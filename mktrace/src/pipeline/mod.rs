// SPDX-License-Identifier: GPL-3.0-or-later

//! The configure pipeline.
//!
//! A configure runs these subphases in order:
//!
//! 1. `LoadFromCache`: once per process lifetime, the state of the previous
//!    run is loaded and pushed to the sink. The rest is background work.
//! 2. `ObtainTrace`: the build log when one is configured and readable,
//!    otherwise the output of the build tool's dry-run.
//! 3. `Preprocess`: normalization of the raw trace.
//! 4. `ParseForConfiguration`: the compile units, pushed to the sink.
//! 5. `ParseForLaunchTargets`: the binaries and their invocations.
//! 6. `ParseForBuildTargets`: the target names from the database dump.
//!    When the selected build target is gone, the selection is cleared and
//!    the pipeline runs once more.
//! 7. `Persist`: the whole state written to the cache.
//!
//! A clean configure replaces the previous state, an incremental configure
//! merges into it.

pub mod guard;
pub mod progress;
pub mod runner;

use crate::config;
use crate::context::SearchPath;
use crate::output::{
    Cache, CacheError, ConfigurationProvider, ConfigurationSink, ConfigurationSnapshot, MergeMode,
    PipelineStatistics, SinkError,
};
use crate::semantic::{BuildTargetExtractor, CompileUnitExtractor, LaunchTargetExtractor, Toolset, launch};
use crate::trace::{CancellationToken, Cancelled, preprocess};
use guard::{Operation, OperationGuards};
use progress::{LogProgress, Progress, ProgressReporter};
use runner::{BuildCommand, CommandRunner, RunOutcome, RunnerError, Stream};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use thiserror::Error;

/// The terminal outcome of a configure, or of a subphase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigureResult {
    Success,
    /// Another configure is in flight.
    Blocked,
    Cancelled,
    /// The build tool is not available.
    NotFound,
    /// The build tool is not available, the state is from the cache.
    OutOfDate,
    Other,
}

impl fmt::Display for ConfigureResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfigureResult::Success => "success",
            ConfigureResult::Blocked => "blocked",
            ConfigureResult::Cancelled => "cancelled",
            ConfigureResult::NotFound => "not found",
            ConfigureResult::OutOfDate => "out of date",
            ConfigureResult::Other => "failed",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subphase {
    LoadFromCache,
    ObtainTrace,
    Preprocess,
    ParseForConfiguration,
    ParseForLaunchTargets,
    ParseForBuildTargets,
    Persist,
}

impl fmt::Display for Subphase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subphase::LoadFromCache => "Loading from cache",
            Subphase::ObtainTrace => "Obtaining the dry-run trace",
            Subphase::Preprocess => "Preprocessing the trace",
            Subphase::ParseForConfiguration => "Parsing for configuration",
            Subphase::ParseForLaunchTargets => "Parsing for launch targets",
            Subphase::ParseForBuildTargets => "Parsing for build targets",
            Subphase::Persist => "Persisting the state",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubphaseResult {
    pub subphase: Subphase,
    pub result: ConfigureResult,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureReport {
    pub result: ConfigureResult,
    pub subphases: Vec<SubphaseResult>,
    /// Whether the pipeline ran again after the selected build target vanished.
    pub recursed: bool,
}

impl ConfigureReport {
    fn new() -> Self {
        Self { result: ConfigureResult::Success, subphases: vec![], recursed: false }
    }

    /// How many times the subphase ran.
    pub fn count(&self, subphase: Subphase) -> usize {
        self.subphases.iter().filter(|entry| entry.subphase == subphase).count()
    }

    pub fn elapsed(&self) -> Duration {
        self.subphases.iter().map(|entry| entry.elapsed).sum()
    }
}

/// The state which outlives a single configure.
#[derive(Debug, Default)]
pub struct PipelineContext {
    /// The selected build target, passed to the dry-run.
    pub build_target: Option<String>,
    /// The canonical form of the selected launch target.
    pub launch_target: Option<String>,
    pub snapshot: ConfigurationSnapshot,
    pub guards: Arc<OperationGuards>,
    cache_load_attempted: bool,
    loaded_from_cache: bool,
}

impl PipelineContext {
    pub fn new(build_target: Option<String>, launch_target: Option<String>) -> Self {
        Self { build_target, launch_target, ..Self::default() }
    }

    pub fn loaded_from_cache(&self) -> bool {
        self.loaded_from_cache
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl PipelineError {
    fn result(&self) -> ConfigureResult {
        match self {
            PipelineError::Cancelled(_) => ConfigureResult::Cancelled,
            PipelineError::Runner(RunnerError::NotFound { .. }) => ConfigureResult::NotFound,
            _ => ConfigureResult::Other,
        }
    }
}

static LOG_PROGRESS: LogProgress = LogProgress;

pub struct ConfigurePipeline<'a> {
    config: &'a config::Main,
    root: PathBuf,
    runner: &'a dyn CommandRunner,
    sink: &'a mut dyn ConfigurationSink,
    search_path: &'a dyn SearchPath,
    progress: &'a dyn ProgressReporter,
    cancel: CancellationToken,
    log_file: Option<PathBuf>,
    platform_sdk_version: Option<String>,
    toolset: Toolset,
    stats: Arc<PipelineStatistics>,
}

impl<'a> ConfigurePipeline<'a> {
    pub fn new(
        config: &'a config::Main,
        root: &Path,
        runner: &'a dyn CommandRunner,
        sink: &'a mut dyn ConfigurationSink,
        search_path: &'a dyn SearchPath,
        cancel: &CancellationToken,
    ) -> Self {
        let toolset =
            Toolset::new(&config.toolchain.compilers, &config.toolchain.linkers, &config.toolchain.exclude);
        Self {
            config,
            root: root.to_path_buf(),
            runner,
            sink,
            search_path,
            progress: &LOG_PROGRESS,
            cancel: cancel.clone(),
            log_file: config.trace.log_file.clone(),
            platform_sdk_version: None,
            toolset,
            stats: PipelineStatistics::new(),
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Reads the trace from the build log instead of running the dry-run.
    pub fn with_log_file(mut self, log_file: Option<PathBuf>) -> Self {
        if log_file.is_some() {
            self.log_file = log_file;
        }
        self
    }

    pub fn with_platform_sdk_version(mut self, version: Option<String>) -> Self {
        self.platform_sdk_version = version;
        self
    }

    pub fn statistics(&self) -> &Arc<PipelineStatistics> {
        &self.stats
    }

    /// Runs the configure, unless another one is in flight.
    pub fn configure(&mut self, ctx: &mut PipelineContext, clean: bool) -> ConfigureReport {
        let guards = Arc::clone(&ctx.guards);
        let Some(_guard) = guards.try_begin(Operation::Configure) else {
            let running = guards.current().map(|operation| operation.to_string()).unwrap_or_default();
            log::warn!("A {running} is already running, the configure request is ignored.");
            let mut report = ConfigureReport::new();
            report.result = ConfigureResult::Blocked;
            return report;
        };

        let mut report = ConfigureReport::new();
        let result = self.run_pass(ctx, clean, &mut report);
        report.result = match result {
            ConfigureResult::NotFound if ctx.loaded_from_cache => ConfigureResult::OutOfDate,
            other => other,
        };

        log::info!("{}", self.stats);
        log::info!("Configure finished: {} ({:.2?})", report.result, report.elapsed());
        report
    }

    fn run_pass(&mut self, ctx: &mut PipelineContext, clean: bool, report: &mut ConfigureReport) -> ConfigureResult {
        let mode = if clean { MergeMode::Replace } else { MergeMode::Merge };
        let mut outcome = ConfigureResult::Success;
        self.stats.reset();

        if !ctx.cache_load_attempted {
            ctx.cache_load_attempted = true;
            let started = self.begin(Subphase::LoadFromCache);
            let result = self.load_from_cache(ctx);
            // A broken cache is not fatal, the configure recreates it.
            let _ = self.end(report, Subphase::LoadFromCache, started, result);
        }

        let started = self.begin(Subphase::ObtainTrace);
        let result = self.obtain_trace(ctx, clean);
        let raw = match self.end(report, Subphase::ObtainTrace, started, result) {
            Ok(raw) => raw,
            Err(result) => return result,
        };

        let started = self.begin(Subphase::Preprocess);
        let result = preprocess::preprocess(&raw, &self.cancel, self.chunk_size()).map_err(PipelineError::from);
        let trace = match self.end(report, Subphase::Preprocess, started, result) {
            Ok(trace) => trace,
            Err(result) => return result,
        };
        drop(raw);
        self.stats.lines_scanned.fetch_add(trace.lines().count(), Ordering::Relaxed);

        let started = self.begin(Subphase::ParseForConfiguration);
        let result = self.parse_for_configuration(ctx, &trace, mode);
        match self.end(report, Subphase::ParseForConfiguration, started, result) {
            Err(ConfigureResult::Cancelled) => return ConfigureResult::Cancelled,
            Err(result) => outcome = worse(outcome, result),
            Ok(()) => {}
        }

        let started = self.begin(Subphase::ParseForLaunchTargets);
        let result = self.parse_for_launch_targets(ctx, &trace, mode);
        match self.end(report, Subphase::ParseForLaunchTargets, started, result) {
            Err(ConfigureResult::Cancelled) => return ConfigureResult::Cancelled,
            Err(result) => outcome = worse(outcome, result),
            Ok(()) => {}
        }

        if clean || ctx.snapshot.build_targets.is_empty() {
            let started = self.begin(Subphase::ParseForBuildTargets);
            let result = self.parse_for_build_targets(ctx, mode);
            match self.end(report, Subphase::ParseForBuildTargets, started, result) {
                Err(ConfigureResult::Cancelled) => return ConfigureResult::Cancelled,
                Err(result) => outcome = worse(outcome, result),
                Ok(true) if !report.recursed => {
                    report.recursed = true;
                    log::info!("Running the configure again without the vanished build target.");
                    return self.run_pass(ctx, clean, report);
                }
                Ok(_) => {}
            }
        } else {
            log::debug!("{} skipped: incremental configure with known targets.", Subphase::ParseForBuildTargets);
        }

        if self.cancel.is_cancelled() {
            log::info!("{} skipped: the configure was cancelled.", Subphase::Persist);
            return ConfigureResult::Cancelled;
        }
        let started = self.begin(Subphase::Persist);
        let result = self.cache().store(&ctx.snapshot).map_err(PipelineError::from);
        if let Err(result) = self.end(report, Subphase::Persist, started, result) {
            outcome = worse(outcome, result);
        }

        if outcome != ConfigureResult::Success {
            log::warn!(
                "The configure finished with problems, the dry-run output is at: {}",
                self.resolve(&self.config.output.trace_file).display()
            );
        }
        outcome
    }

    fn begin(&self, subphase: Subphase) -> Instant {
        self.progress.report(Progress::Status(subphase.to_string()));
        Instant::now()
    }

    fn end<T>(
        &self,
        report: &mut ConfigureReport,
        subphase: Subphase,
        started: Instant,
        result: Result<T, PipelineError>,
    ) -> Result<T, ConfigureResult> {
        let elapsed = started.elapsed();
        let (value, outcome) = match result {
            Ok(value) => {
                log::info!("{subphase} finished ({elapsed:.2?})");
                (Ok(value), ConfigureResult::Success)
            }
            Err(PipelineError::Cancelled(_)) => {
                log::info!("{subphase} cancelled ({elapsed:.2?})");
                (Err(ConfigureResult::Cancelled), ConfigureResult::Cancelled)
            }
            Err(error) => {
                log::error!("{subphase} failed ({elapsed:.2?}): {error}");
                let outcome = error.result();
                (Err(outcome), outcome)
            }
        };
        report.subphases.push(SubphaseResult { subphase, result: outcome, elapsed });
        self.progress.report(Progress::Increment);
        value
    }

    fn load_from_cache(&mut self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let Some(snapshot) = self.cache().load()? else {
            return Ok(());
        };
        self.sink.push(&snapshot.configuration, MergeMode::Replace)?;
        log::info!(
            "Loaded {} files, {} launch targets and {} build targets from the cache. The configure continues in the background.",
            snapshot.configuration.files().len(),
            snapshot.launch_targets.len(),
            snapshot.build_targets.len()
        );
        ctx.snapshot = snapshot;
        ctx.loaded_from_cache = true;
        Ok(())
    }

    fn obtain_trace(&self, ctx: &PipelineContext, clean: bool) -> Result<String, PipelineError> {
        if let Some(log_file) = &self.log_file {
            let path = self.resolve(log_file);
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    log::info!("Reading the trace from the build log: {}", path.display());
                    return Ok(content);
                }
                Err(error) => {
                    log::warn!("The build log '{}' is not readable, running the dry-run: {error}", path.display())
                }
            }
        }

        let make = &self.config.make;
        let mut arguments = make.dry_run_switches.clone();
        if clean {
            arguments.push(make.force_rebuild_switch.clone());
        }
        arguments.extend(self.makefile_arguments());
        arguments.extend(ctx.build_target.iter().cloned());
        arguments.extend(make.extra_arguments.iter().cloned());

        let (trace, outcome) = self.run_make(arguments)?;
        if outcome.exit_code != Some(0) {
            log::warn!("The dry-run exited with {:?}, the output is used as it is.", outcome.exit_code);
        }
        self.keep_trace_copy(&trace);
        Ok(trace)
    }

    fn parse_for_configuration(
        &mut self,
        ctx: &mut PipelineContext,
        trace: &str,
        mode: MergeMode,
    ) -> Result<(), PipelineError> {
        let extractor = CompileUnitExtractor::new(&self.toolset, self.search_path, &self.root)
            .with_gnu_standards(self.config.toolchain.gnu_standards)
            .with_platform_sdk_version(self.platform_sdk_version.clone());

        let mut provider = ConfigurationProvider::new();
        let mut scan = extractor.scan(trace, &self.cancel, self.chunk_size());
        for unit in scan.by_ref() {
            provider.apply(&unit);
            self.stats.compile_units.fetch_add(1, Ordering::Relaxed);
        }
        if scan.is_cancelled() {
            return Err(Cancelled.into());
        }
        drop(scan);

        self.sink.push(&provider, mode)?;
        ctx.snapshot.configuration.update(&provider, mode);
        self.stats.source_files.store(ctx.snapshot.configuration.files().len(), Ordering::Relaxed);
        Ok(())
    }

    fn parse_for_launch_targets(
        &self,
        ctx: &mut PipelineContext,
        trace: &str,
        mode: MergeMode,
    ) -> Result<(), PipelineError> {
        let extractor = LaunchTargetExtractor::new(&self.toolset, &self.root);
        let targets = extractor.extract(trace, &self.cancel, self.chunk_size())?;

        ctx.snapshot.launch_targets = match mode {
            MergeMode::Replace => targets,
            MergeMode::Merge => {
                let previous = std::mem::take(&mut ctx.snapshot.launch_targets);
                launch::deduplicate(previous.into_iter().chain(targets))
            }
        };
        self.stats.launch_targets.store(ctx.snapshot.launch_targets.len(), Ordering::Relaxed);

        if let Some(selected) = &ctx.launch_target {
            if !ctx.snapshot.has_launch_target(selected) {
                log::warn!("The selected launch target is gone: {selected}");
                ctx.launch_target = None;
            }
        }
        Ok(())
    }

    /// Updates the build targets, returns whether the selected one vanished.
    fn parse_for_build_targets(&self, ctx: &mut PipelineContext, mode: MergeMode) -> Result<bool, PipelineError> {
        let make = &self.config.make;
        let mut arguments = make.database_switches.clone();
        arguments.extend(self.makefile_arguments());
        arguments.extend(make.extra_arguments.iter().cloned());

        let (dump, outcome) = self.run_make(arguments)?;
        log::debug!("The database dump exited with {:?}", outcome.exit_code);
        let found = BuildTargetExtractor::extract(&dump, &self.cancel, self.chunk_size())?;

        let mut targets = match mode {
            MergeMode::Replace => found,
            MergeMode::Merge => std::mem::take(&mut ctx.snapshot.build_targets).into_iter().chain(found).collect(),
        };
        targets.sort();
        targets.dedup();
        ctx.snapshot.build_targets = targets;
        self.stats.build_targets.store(ctx.snapshot.build_targets.len(), Ordering::Relaxed);

        match &ctx.build_target {
            Some(selected) if !ctx.snapshot.has_build_target(selected) => {
                log::warn!("The selected build target is gone: {selected}");
                ctx.build_target = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Runs the build tool in the workspace root, returns the standard output.
    fn run_make(&self, arguments: Vec<String>) -> Result<(String, RunOutcome), PipelineError> {
        let command = BuildCommand {
            program: self.config.make.program.clone(),
            arguments,
            working_directory: self.root.clone(),
        };
        log::info!("Running: {command}");

        let mut output = String::new();
        let outcome = self.runner.run(
            &command,
            &mut |stream, line| match stream {
                Stream::Stdout => {
                    output.push_str(line);
                    output.push('\n');
                }
                Stream::Stderr => log::debug!("[stderr] {line}"),
            },
            &self.cancel,
        )?;
        if outcome.cancelled {
            return Err(Cancelled.into());
        }
        self.cancel.check()?;
        Ok((output, outcome))
    }

    fn keep_trace_copy(&self, trace: &str) {
        let path = self.resolve(&self.config.output.trace_file);
        let result = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| std::fs::write(&path, trace));
        match result {
            Ok(()) => log::debug!("Dry-run output saved: {}", path.display()),
            Err(error) => log::warn!("Failed to save the dry-run output to '{}': {error}", path.display()),
        }
    }

    fn makefile_arguments(&self) -> Vec<String> {
        match &self.config.make.makefile {
            Some(makefile) => vec![String::from("-f"), makefile.to_string_lossy().into_owned()],
            None => vec![],
        }
    }

    fn cache(&self) -> Cache {
        Cache::new(&self.resolve(&self.config.output.cache_file))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) }
    }

    fn chunk_size(&self) -> usize {
        self.config.trace.chunk_size
    }
}

/// The first problem is the one reported.
fn worse(current: ConfigureResult, next: ConfigureResult) -> ConfigureResult {
    if current == ConfigureResult::Success { next } else { current }
}
