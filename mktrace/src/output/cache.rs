// SPDX-License-Identifier: GPL-3.0-or-later

//! The persisted state of the last configure.
//!
//! The document keeps everything a later run needs without parsing the
//! trace again:
//!
//! ```json
//! {
//!   "buildTargets": ["all", "clean"],
//!   "launchTargets": ["/w>app(--fast)"],
//!   "fileIndex": [["/w/main.c", { "defines": [], ... }]],
//!   "browsePath": ["/w", "/w/include"]
//! }
//! ```

use super::json::{self, JsonFileError};
use super::provider::{BrowsePath, ConfigurationProvider, FileConfiguration};
use super::ConfigurationSnapshot;
use crate::semantic::LaunchTarget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to read the cache: {0}")]
    Read(JsonFileError),
    #[error("Failed to write the cache: {0}")]
    Write(JsonFileError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheDocument {
    #[serde(default)]
    build_targets: Vec<String>,
    #[serde(default)]
    launch_targets: Vec<LaunchTarget>,
    #[serde(default)]
    file_index: Vec<(PathBuf, FileConfiguration)>,
    #[serde(default)]
    browse_path: BrowsePath,
}

impl From<&ConfigurationSnapshot> for CacheDocument {
    fn from(snapshot: &ConfigurationSnapshot) -> Self {
        Self {
            build_targets: snapshot.build_targets.clone(),
            launch_targets: snapshot.launch_targets.clone(),
            file_index: snapshot
                .configuration
                .files()
                .iter()
                .map(|(path, configuration)| (path.clone(), configuration.clone()))
                .collect(),
            browse_path: snapshot.configuration.browse_path().clone(),
        }
    }
}

impl From<CacheDocument> for ConfigurationSnapshot {
    fn from(document: CacheDocument) -> Self {
        Self {
            configuration: ConfigurationProvider::from_parts(
                document.file_index.into_iter().collect(),
                document.browse_path,
            ),
            build_targets: document.build_targets,
            launch_targets: document.launch_targets,
        }
    }
}

/// The cache file of a workspace.
#[derive(Debug, Clone)]
pub struct Cache {
    path: PathBuf,
}

impl Cache {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The previous state, or `None` when there was no configure before.
    pub fn load(&self) -> Result<Option<ConfigurationSnapshot>, CacheError> {
        if !self.path.exists() {
            log::debug!("No cache found at {}", self.path.display());
            return Ok(None);
        }
        let document: CacheDocument = json::read(&self.path).map_err(CacheError::Read)?;
        Ok(Some(document.into()))
    }

    pub fn store(&self, snapshot: &ConfigurationSnapshot) -> Result<(), CacheError> {
        json::write_atomically(&self.path, &CacheDocument::from(snapshot)).map_err(CacheError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::{Architecture, ToolchainFamily, ToolchainMode};
    use tempfile::tempdir;

    fn snapshot() -> ConfigurationSnapshot {
        let configuration = FileConfiguration {
            defines: vec!["NDEBUG".to_string()],
            include_paths: vec![PathBuf::from("/w/include")],
            forced_includes: vec![],
            standard: None,
            compiler_path: PathBuf::from("/usr/bin/gcc"),
            toolchain_mode: ToolchainMode::new(ToolchainFamily::Gcc, Architecture::X64),
            platform_sdk_version: None,
        };
        ConfigurationSnapshot {
            configuration: ConfigurationProvider::from_parts(
                [(PathBuf::from("/w/main.c"), configuration)].into_iter().collect(),
                BrowsePath::from(vec![PathBuf::from("/w/include"), PathBuf::from("/w")]),
            ),
            build_targets: vec!["all".to_string(), "clean".to_string()],
            launch_targets: vec![LaunchTarget::new(
                PathBuf::from("/w/out/app"),
                PathBuf::from("/w"),
                vec!["--fast".to_string()],
            )],
        }
    }

    #[test]
    fn test_store_and_load() {
        let dir = tempdir().unwrap();
        let sut = Cache::new(&dir.path().join("cache.json"));

        sut.store(&snapshot()).unwrap();

        assert_eq!(sut.load().unwrap(), Some(snapshot()));
    }

    #[test]
    fn test_document_shape() {
        let dir = tempdir().unwrap();
        let sut = Cache::new(&dir.path().join("cache.json"));

        sut.store(&snapshot()).unwrap();

        let value: serde_json::Value = json::read(sut.path()).unwrap();
        assert_eq!(value["buildTargets"], serde_json::json!(["all", "clean"]));
        assert_eq!(value["launchTargets"], serde_json::json!(["/w>out/app(--fast)"]));
        assert_eq!(value["fileIndex"][0][0], serde_json::json!("/w/main.c"));
        assert_eq!(value["fileIndex"][0][1]["compilerPath"], serde_json::json!("/usr/bin/gcc"));
        assert_eq!(value["fileIndex"][0][1]["toolchainMode"], serde_json::json!("gcc-x64"));
        assert_eq!(value["browsePath"], serde_json::json!(["/w/include", "/w"]));
    }

    #[test]
    fn test_missing_cache() {
        let dir = tempdir().unwrap();
        let sut = Cache::new(&dir.path().join("cache.json"));

        assert_eq!(sut.load().unwrap(), None);
    }

    #[test]
    fn test_broken_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "[").unwrap();

        assert!(matches!(Cache::new(&path).load(), Err(CacheError::Read(_))));
    }
}
