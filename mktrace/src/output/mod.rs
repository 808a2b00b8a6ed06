// SPDX-License-Identifier: GPL-3.0-or-later

//! This module is responsible for the results of the configure.
//!
//! The code-intelligence configuration is accumulated by the
//! `ConfigurationProvider` and pushed to a `ConfigurationSink`. The whole
//! state of a configure (configuration, build targets, launch targets) is
//! the `ConfigurationSnapshot`, which the `Cache` persists between runs.

mod cache;
mod json;
mod provider;
mod statistics;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::semantic::LaunchTarget;

// Re-export types for convenience.
pub use cache::{Cache, CacheError};
pub use json::{JsonFileError, temporary_path};
pub use provider::{BrowsePath, ConfigurationProvider, FileConfiguration, MergeMode};
pub use statistics::PipelineStatistics;

/// Everything a configure produces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigurationSnapshot {
    pub configuration: ConfigurationProvider,
    /// Sorted, unique build target names.
    pub build_targets: Vec<String>,
    /// Unique launch targets, in discovery order.
    pub launch_targets: Vec<LaunchTarget>,
}

impl ConfigurationSnapshot {
    /// Whether the launch target is still among the known ones.
    pub fn has_launch_target(&self, canonical: &str) -> bool {
        self.launch_targets.iter().any(|target| target.canonical() == canonical)
    }

    pub fn has_build_target(&self, name: &str) -> bool {
        self.build_targets.iter().any(|target| target == name)
    }
}

/// The consumer of the code-intelligence configuration.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigurationSink {
    /// Takes the configuration of a configure pass.
    ///
    /// `MergeMode::Replace` drops everything the sink received before,
    /// `MergeMode::Merge` updates it per file.
    fn push(&mut self, configuration: &ConfigurationProvider, mode: MergeMode) -> Result<(), SinkError>;
}

/// Represents errors that can occur while pushing to a sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write the configuration: {0}")]
    Io(#[from] JsonFileError),
}

/// The on-disk form of the code-intelligence configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigurationDocument {
    #[serde(default)]
    files: BTreeMap<PathBuf, FileConfiguration>,
    #[serde(default)]
    browse_path: BrowsePath,
}

/// A sink which keeps the configuration in a JSON file.
///
/// The file content is the result of every push since the last replace.
/// The file is rewritten atomically after each push.
pub struct JsonFileSink {
    path: PathBuf,
    state: ConfigurationProvider,
}

impl JsonFileSink {
    /// Creates the sink, starting from the content of the file if any.
    ///
    /// # Note
    /// Reading errors will be ignored, and a warning will be logged.
    pub fn new(path: &Path) -> Self {
        let state = if path.exists() {
            match json::read::<ConfigurationDocument>(path) {
                Ok(document) => ConfigurationProvider::from_parts(document.files, document.browse_path),
                Err(error) => {
                    log::warn!("Problems to read the previous configuration: {error}");
                    ConfigurationProvider::new()
                }
            }
        } else {
            ConfigurationProvider::new()
        };
        Self { path: path.to_path_buf(), state }
    }

    pub fn state(&self) -> &ConfigurationProvider {
        &self.state
    }
}

impl ConfigurationSink for JsonFileSink {
    fn push(&mut self, configuration: &ConfigurationProvider, mode: MergeMode) -> Result<(), SinkError> {
        self.state.update(configuration, mode);

        let document = ConfigurationDocument {
            files: self.state.files().clone(),
            browse_path: self.state.browse_path().clone(),
        };
        json::write_atomically(&self.path, &document)?;

        log::debug!("Configuration of {} files written to {}", self.state.files().len(), self.path.display());
        Ok(())
    }
}
