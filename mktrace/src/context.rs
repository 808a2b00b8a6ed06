// SPDX-License-Identifier: GPL-3.0-or-later

use crate::environment;
use crate::environment::{KEY_MSVC__SDK_VERSION, KEY_OS__PATH};
use anyhow::{Context as AnyhowContext, Result};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

/// Application context containing runtime environment information.
///
/// Captured once at startup, so the later phases don't need to query the
/// process environment again.
#[derive(Debug, Clone)]
pub struct Context {
    /// Current working directory when the program was invoked
    pub current_directory: PathBuf,
    /// All environment variables at startup
    pub environment: HashMap<String, String>,
}

impl Context {
    /// Capture the current application context.
    pub fn capture() -> Result<Self> {
        let current_directory =
            env::current_dir().with_context(|| "Failed to get current working directory")?;

        let environment = env::vars().collect::<HashMap<String, String>>();

        Ok(Context { current_directory, environment })
    }

    /// Returns the PATH environment variable key and value.
    ///
    /// This is relevant for Windows where the PATH is not capitalized and the lookup
    /// should be case insensitive.
    pub fn path(&self) -> Option<(String, String)> {
        self.environment
            .iter()
            .find(|(key, _)| key.to_uppercase() == KEY_OS__PATH)
            .map(|(key, value)| (key.clone(), value.clone()))
    }

    /// Parses the PATH environment variable from context into a vector of directories.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.path().map(|(_, path)| std::env::split_paths(&path).collect()).unwrap_or_default()
    }

    /// The Windows SDK version of a developer command prompt (without the trailing separator).
    pub fn platform_sdk_version(&self) -> Option<String> {
        self.environment
            .get(KEY_MSVC__SDK_VERSION)
            .map(|version| version.trim().trim_end_matches(['\\', '/']).to_string())
            .filter(|version| !version.is_empty())
    }

    /// The search path of the executables, for the compilers named without path.
    pub fn search_path(&self) -> EnvironmentSearchPath {
        EnvironmentSearchPath::new(self.path().map(|(_, value)| value), &self.current_directory)
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Application Context:")?;
        writeln!(f, "Current Directory: {}", self.current_directory.display())?;
        writeln!(f, "Total Environment Variables: {} entries", self.environment.len())?;

        writeln!(f, "Relevant Environment Variables:")?;
        let mut relevant: Vec<_> =
            self.environment.iter().filter(|(key, _)| environment::relevant_env(key)).collect();
        relevant.sort();
        for (key, value) in relevant {
            writeln!(f, "  {}={}", key, value)?;
        }

        Ok(())
    }
}

/// Resolves an unqualified executable name to a full path.
#[cfg_attr(test, mockall::automock)]
pub trait SearchPath {
    fn find(&self, name: &str) -> Option<PathBuf>;
}

/// Search path lookup over the `PATH` directories, like the shell does it.
#[derive(Debug, Clone)]
pub struct EnvironmentSearchPath {
    paths: Option<String>,
    working_directory: PathBuf,
}

impl EnvironmentSearchPath {
    pub fn new(paths: Option<String>, working_directory: &Path) -> Self {
        Self { paths, working_directory: working_directory.to_path_buf() }
    }
}

impl SearchPath for EnvironmentSearchPath {
    fn find(&self, name: &str) -> Option<PathBuf> {
        match which::which_in(name, self.paths.as_ref(), &self.working_directory) {
            Ok(path) => Some(path),
            Err(error) => {
                log::debug!("Executable '{name}' not found in PATH: {error}");
                None
            }
        }
    }
}
