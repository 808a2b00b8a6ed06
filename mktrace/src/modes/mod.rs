// SPDX-License-Identifier: GPL-3.0-or-later

use crate::context::Context;
use crate::output::{Cache, ConfigurationSnapshot, JsonFileSink};
use crate::pipeline::runner::ProcessRunner;
use crate::pipeline::{ConfigurePipeline, ConfigureResult, PipelineContext};
use crate::semantic::LaunchTarget;
use crate::semantic::launch::LaunchTargetError;
use crate::trace::{CancellationToken, make_full_path};
use crate::{args, config};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

/// Exit code of a cancelled configure (like a shell reports SIGINT).
const EXIT_CANCELLED: u8 = 130;

/// Represent the modes the application can run in.
///
/// To the user the modes are:
/// - configure: parse the dry-run trace, update the sink and the cache.
/// - targets, launch-targets: print the lists the last configure found.
/// - resolve-launch: print what the launch collaborator gets for a target.
pub enum Mode {
    Configure(Box<Configure>),
    Targets(Cache),
    LaunchTargets(Cache),
    ResolveLaunch(LaunchTarget),
}

pub struct Configure {
    root: PathBuf,
    clean: bool,
    log_file: Option<PathBuf>,
    context: PipelineContext,
    config: config::Main,
    environment: Context,
    cancel: CancellationToken,
}

/// The launch collaborator's view of a launch target.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolvedLaunch<'a> {
    binary_path: &'a Path,
    working_directory: &'a Path,
    arguments: &'a [String],
}

impl Mode {
    /// Configure the application mode based on the command line arguments and the configuration.
    ///
    /// Here we are checking if the command line arguments and configuration are valid.
    /// If the arguments are valid, we create the appropriate mode instance.
    /// If that is not the case, we try to return a useful error message.
    pub fn configure(
        context: Context,
        args: args::Arguments,
        config: config::Main,
        cancel: &CancellationToken,
    ) -> Result<Self, ConfigurationError> {
        match args.mode {
            args::Mode::Configure { clean, log_file, build_target, launch_target, directory } => {
                log::debug!("Mode: configure (clean: {clean})");

                let root = workspace_root(&context, directory.as_deref());
                if !root.is_dir() {
                    return Err(ConfigurationError::InvalidWorkspace(root));
                }
                let log_file = log_file.map(|path| make_full_path(&path.to_string_lossy(), &context.current_directory));
                if let Some(canonical) = &launch_target {
                    canonical.parse::<LaunchTarget>()?;
                }

                Ok(Self::Configure(Box::new(Configure {
                    root,
                    clean,
                    log_file,
                    context: PipelineContext::new(build_target, launch_target),
                    config,
                    environment: context,
                    cancel: cancel.clone(),
                })))
            }
            args::Mode::Targets { directory } => {
                log::debug!("Mode: list build targets");
                Ok(Self::Targets(cache_of(&context, &config, directory.as_deref())))
            }
            args::Mode::LaunchTargets { directory } => {
                log::debug!("Mode: list launch targets");
                Ok(Self::LaunchTargets(cache_of(&context, &config, directory.as_deref())))
            }
            args::Mode::ResolveLaunch { canonical } => {
                log::debug!("Mode: resolve launch target");
                Ok(Self::ResolveLaunch(canonical.parse()?))
            }
        }
    }

    /// It actually runs the application mode.
    ///
    /// These errors are all run-time errors, the user were passing valid
    /// arguments and configurations.
    pub fn run(self) -> ExitCode {
        match self {
            Self::Configure(configure) => configure.run(),
            Self::Targets(cache) => Self::print(&cache, |snapshot| snapshot.build_targets.clone()),
            Self::LaunchTargets(cache) => Self::print(&cache, |snapshot| {
                snapshot.launch_targets.iter().map(LaunchTarget::canonical).collect()
            }),
            Self::ResolveLaunch(target) => {
                let resolved = ResolvedLaunch {
                    binary_path: &target.binary_path,
                    working_directory: &target.working_directory,
                    arguments: &target.arguments,
                };
                match serde_json::to_string_pretty(&resolved) {
                    Ok(json) => {
                        println!("{json}");
                        ExitCode::SUCCESS
                    }
                    Err(error) => {
                        log::error!("mktrace: {error}");
                        ExitCode::FAILURE
                    }
                }
            }
        }
    }

    fn print(cache: &Cache, lines: impl Fn(&ConfigurationSnapshot) -> Vec<String>) -> ExitCode {
        match cache.load() {
            Ok(Some(snapshot)) => {
                for line in lines(&snapshot) {
                    println!("{line}");
                }
                ExitCode::SUCCESS
            }
            Ok(None) => {
                log::warn!("No configure state at {}, run the configure first.", cache.path().display());
                ExitCode::SUCCESS
            }
            Err(error) => {
                log::error!("mktrace: {error}");
                ExitCode::FAILURE
            }
        }
    }
}

impl Configure {
    fn run(mut self) -> ExitCode {
        let runner = ProcessRunner::new(Duration::from_secs(self.config.trace.stall_timeout));
        let search_path = self.environment.search_path();
        let mut sink = JsonFileSink::new(&resolve(&self.root, &self.config.output.configuration_file));

        let mut pipeline = ConfigurePipeline::new(
            &self.config,
            &self.root,
            &runner,
            &mut sink,
            &search_path,
            &self.cancel,
        )
        .with_log_file(self.log_file.clone())
        .with_platform_sdk_version(self.environment.platform_sdk_version());

        let report = pipeline.configure(&mut self.context, self.clean);
        for entry in &report.subphases {
            log::debug!("{}: {} ({:.2?})", entry.subphase, entry.result, entry.elapsed);
        }
        match report.result {
            ConfigureResult::Success => ExitCode::SUCCESS,
            ConfigureResult::Cancelled => ExitCode::from(EXIT_CANCELLED),
            other => {
                log::error!("mktrace: configure {other}");
                ExitCode::FAILURE
            }
        }
    }
}

fn workspace_root(context: &Context, directory: Option<&Path>) -> PathBuf {
    match directory {
        Some(directory) => make_full_path(&directory.to_string_lossy(), &context.current_directory),
        None => context.current_directory.clone(),
    }
}

fn cache_of(context: &Context, config: &config::Main, directory: Option<&Path>) -> Cache {
    let root = workspace_root(context, directory);
    Cache::new(&resolve(&root, &config.output.cache_file))
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() { path.to_path_buf() } else { root.join(path) }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Workspace directory does not exist: {}", .0.display())]
    InvalidWorkspace(PathBuf),
    #[error("Invalid launch target: {0}")]
    InvalidLaunchTarget(#[from] LaunchTargetError),
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn context(directory: &Path) -> Context {
        Context { current_directory: directory.to_path_buf(), environment: Default::default() }
    }

    fn arguments(mode: args::Mode) -> args::Arguments {
        args::Arguments { config: None, verbose: 0, mode }
    }

    #[test]
    fn test_configure_rejects_missing_workspace() {
        let root = TempDir::new().unwrap();
        let mode = args::Mode::Configure {
            clean: false,
            log_file: None,
            build_target: None,
            launch_target: None,
            directory: Some(PathBuf::from("missing")),
        };

        let result =
            Mode::configure(context(root.path()), arguments(mode), config::Main::default(), &CancellationToken::new());

        assert!(matches!(result, Err(ConfigurationError::InvalidWorkspace(_))));
    }

    #[test]
    fn test_configure_rejects_malformed_launch_target() {
        let root = TempDir::new().unwrap();
        let mode = args::Mode::Configure {
            clean: false,
            log_file: None,
            build_target: None,
            launch_target: Some(String::from("no separator")),
            directory: None,
        };

        let result =
            Mode::configure(context(root.path()), arguments(mode), config::Main::default(), &CancellationToken::new());

        assert!(matches!(result, Err(ConfigurationError::InvalidLaunchTarget(_))));
    }

    #[test]
    fn test_cache_location() {
        let root = Path::new("/w");
        let config = config::Main::default();

        assert_eq!(cache_of(&context(root), &config, None).path(), Path::new("/w/.mktrace/cache.json"));
        assert_eq!(
            cache_of(&context(root), &config, Some(Path::new("sub/../other"))).path(),
            Path::new("/w/other/.mktrace/cache.json")
        );
    }

    #[test]
    fn test_resolved_launch_form() {
        let target: LaunchTarget = "/w>out/app(--fast,-n)".parse().unwrap();
        let resolved = ResolvedLaunch {
            binary_path: &target.binary_path,
            working_directory: &target.working_directory,
            arguments: &target.arguments,
        };

        let value = serde_json::to_value(&resolved).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "binaryPath": "/w/out/app",
                "workingDirectory": "/w",
                "arguments": ["--fast", "-n"],
            })
        );
    }
}
