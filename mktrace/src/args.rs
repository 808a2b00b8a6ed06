// SPDX-License-Identifier: GPL-3.0-or-later

//! This module contains the command line interface of the application.
//!
//! The command line parsing is implemented using the `clap` library.
//! The module is defining types to represent a structured form of the
//! program invocation. The `Arguments` type is used to represent all
//! possible invocations of the program.

use anyhow::anyhow;
use clap::{ArgAction, ArgMatches, Command, arg, command, value_parser};
use std::fmt;
use std::path::PathBuf;

/// Common constants used in the module.
const MODE_CONFIGURE_SUBCOMMAND: &str = "configure";
const MODE_TARGETS_SUBCOMMAND: &str = "targets";
const MODE_LAUNCH_TARGETS_SUBCOMMAND: &str = "launch-targets";
const MODE_RESOLVE_LAUNCH_SUBCOMMAND: &str = "resolve-launch";

/// Represents the command line arguments of the application.
#[derive(Debug, PartialEq)]
pub struct Arguments {
    // The path of the configuration file.
    pub config: Option<String>,
    // The number of `-v` flags.
    pub verbose: u8,
    // The mode of the application.
    pub mode: Mode,
}

/// Represents the mode of the application.
#[derive(Debug, PartialEq)]
pub enum Mode {
    Configure {
        clean: bool,
        log_file: Option<PathBuf>,
        build_target: Option<String>,
        launch_target: Option<String>,
        directory: Option<PathBuf>,
    },
    Targets {
        directory: Option<PathBuf>,
    },
    LaunchTargets {
        directory: Option<PathBuf>,
    },
    ResolveLaunch {
        canonical: String,
    },
}

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Arguments:")?;
        if let Some(config) = &self.config {
            writeln!(f, "  config: {config}")?;
        }
        match &self.mode {
            Mode::Configure { clean, log_file, build_target, launch_target, directory } => {
                writeln!(f, "  mode: configure")?;
                writeln!(f, "  clean: {clean}")?;
                if let Some(log_file) = log_file {
                    writeln!(f, "  log file: {}", log_file.display())?;
                }
                if let Some(target) = build_target {
                    writeln!(f, "  build target: {target}")?;
                }
                if let Some(target) = launch_target {
                    writeln!(f, "  launch target: {target}")?;
                }
                if let Some(directory) = directory {
                    writeln!(f, "  directory: {}", directory.display())?;
                }
            }
            Mode::Targets { .. } => writeln!(f, "  mode: targets")?,
            Mode::LaunchTargets { .. } => writeln!(f, "  mode: launch-targets")?,
            Mode::ResolveLaunch { canonical } => {
                writeln!(f, "  mode: resolve-launch")?;
                writeln!(f, "  target: {canonical}")?;
            }
        }
        Ok(())
    }
}

impl TryFrom<ArgMatches> for Arguments {
    type Error = anyhow::Error;

    fn try_from(matches: ArgMatches) -> Result<Self, Self::Error> {
        let config = matches.get_one::<String>("config").map(String::to_string);
        let verbose = matches.get_count("verbose");

        let mode = match matches.subcommand() {
            Some((MODE_CONFIGURE_SUBCOMMAND, configure_matches)) => Mode::Configure {
                clean: configure_matches.get_flag("clean"),
                log_file: configure_matches.get_one::<PathBuf>("log").cloned(),
                build_target: configure_matches.get_one::<String>("target").cloned(),
                launch_target: configure_matches.get_one::<String>("launch-target").cloned(),
                directory: directory(configure_matches),
            },
            Some((MODE_TARGETS_SUBCOMMAND, targets_matches)) => {
                Mode::Targets { directory: directory(targets_matches) }
            }
            Some((MODE_LAUNCH_TARGETS_SUBCOMMAND, launch_matches)) => {
                Mode::LaunchTargets { directory: directory(launch_matches) }
            }
            Some((MODE_RESOLVE_LAUNCH_SUBCOMMAND, resolve_matches)) => {
                let canonical = resolve_matches
                    .get_one::<String>("CANONICAL")
                    .cloned()
                    .ok_or_else(|| anyhow!("missing launch target"))?;
                Mode::ResolveLaunch { canonical }
            }
            _ => return Err(anyhow!("unrecognized subcommand")),
        };
        Ok(Arguments { config, verbose, mode })
    }
}

fn directory(matches: &ArgMatches) -> Option<PathBuf> {
    matches.get_one::<PathBuf>("directory").cloned()
}

fn directory_arg() -> clap::Arg {
    arg!(-C --directory <DIR> "Workspace directory (default: the current directory)")
        .value_parser(value_parser!(PathBuf))
}

/// Represents the command line interface of the application.
///
/// The different modes of the application are represented as subcommands.
pub fn cli() -> Command {
    command!()
        .subcommand_required(true)
        .arg_required_else_help(true)
        .args(&[
            arg!(-v --verbose ... "Sets the level of verbosity").action(ArgAction::Count),
            arg!(-c --config <FILE> "Path of the config file"),
        ])
        .subcommand(
            Command::new(MODE_CONFIGURE_SUBCOMMAND)
                .about("parses the dry-run trace of the build into configurations and targets")
                .args(&[
                    arg!(--clean "Replace the previous state instead of merging into it")
                        .action(ArgAction::SetTrue),
                    arg!(--log <FILE> "Read the trace from a build log instead of running the dry-run")
                        .value_parser(value_parser!(PathBuf)),
                    arg!(--target <NAME> "The build target passed to the dry-run"),
                    arg!(--"launch-target" <CANONICAL> "The selected launch target"),
                    directory_arg(),
                ]),
        )
        .subcommand(
            Command::new(MODE_TARGETS_SUBCOMMAND).about("lists the build targets of the last configure").arg(directory_arg()),
        )
        .subcommand(
            Command::new(MODE_LAUNCH_TARGETS_SUBCOMMAND)
                .about("lists the launch targets of the last configure")
                .arg(directory_arg()),
        )
        .subcommand(
            Command::new(MODE_RESOLVE_LAUNCH_SUBCOMMAND)
                .about("prints the binary, the working directory and the arguments of a launch target")
                .arg(arg!(<CANONICAL> "Launch target in canonical form")),
        )
}
