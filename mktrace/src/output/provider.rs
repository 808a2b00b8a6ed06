// SPDX-License-Identifier: GPL-3.0-or-later

//! The code-intelligence configuration: one entry per source file, and the
//! workspace-wide browse path.
//!
//! The state is always what replaying every compile unit applied since the
//! last replace gives, in application order, where the last write wins for
//! each file.

use crate::semantic::{CompileUnit, Standard, ToolchainMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// The compiler configuration of a single source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfiguration {
    pub defines: Vec<String>,
    pub include_paths: Vec<PathBuf>,
    pub forced_includes: Vec<PathBuf>,
    pub standard: Option<Standard>,
    pub compiler_path: PathBuf,
    pub toolchain_mode: ToolchainMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_sdk_version: Option<String>,
}

impl From<&CompileUnit> for FileConfiguration {
    fn from(unit: &CompileUnit) -> Self {
        Self {
            defines: unit.defines.clone(),
            include_paths: unit.include_paths.clone(),
            forced_includes: unit.forced_includes.clone(),
            standard: unit.language_standard,
            compiler_path: unit.compiler_full_path.clone(),
            toolchain_mode: unit.toolchain_mode,
            platform_sdk_version: unit.platform_sdk_version.clone(),
        }
    }
}

/// How a newer configuration is combined with the existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    /// Clean configure: the new state replaces the old one.
    Replace,
    /// Incremental configure: the new state is merged into the old one.
    Merge,
}

/// Ordered, duplicate-free list of directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PathBuf>", into = "Vec<PathBuf>")]
pub struct BrowsePath {
    entries: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

impl BrowsePath {
    pub fn insert(&mut self, directory: &Path) {
        if self.seen.insert(directory.to_path_buf()) {
            self.entries.push(directory.to_path_buf());
        }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.seen.clear();
    }
}

impl From<Vec<PathBuf>> for BrowsePath {
    fn from(entries: Vec<PathBuf>) -> Self {
        let mut result = Self::default();
        for entry in &entries {
            result.insert(entry);
        }
        result
    }
}

impl From<BrowsePath> for Vec<PathBuf> {
    fn from(browse_path: BrowsePath) -> Self {
        browse_path.entries
    }
}

/// Accumulates the compile units into the per-file index and the browse path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationProvider {
    files: BTreeMap<PathBuf, FileConfiguration>,
    browse_path: BrowsePath,
}

impl ConfigurationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(files: BTreeMap<PathBuf, FileConfiguration>, browse_path: BrowsePath) -> Self {
        Self { files, browse_path }
    }

    /// Records the compile unit: every source file gets the configuration,
    /// the directories go to the browse path.
    pub fn apply(&mut self, unit: &CompileUnit) {
        let configuration = FileConfiguration::from(unit);

        for directory in &unit.include_paths {
            self.browse_path.insert(directory);
        }
        for file in &unit.forced_includes {
            if let Some(directory) = file.parent() {
                self.browse_path.insert(directory);
            }
        }
        for source in &unit.source_files {
            if let Some(directory) = source.parent() {
                self.browse_path.insert(directory);
            }
            self.files.insert(source.clone(), configuration.clone());
        }
    }

    /// Combines the configuration of a pass into this one.
    pub fn update(&mut self, other: &ConfigurationProvider, mode: MergeMode) {
        if mode == MergeMode::Replace {
            self.files.clear();
            self.browse_path.clear();
        }
        for (path, configuration) in &other.files {
            self.files.insert(path.clone(), configuration.clone());
        }
        for directory in other.browse_path.entries() {
            self.browse_path.insert(directory);
        }
    }

    pub fn get(&self, file: &Path) -> Option<&FileConfiguration> {
        self.files.get(file)
    }

    pub fn files(&self) -> &BTreeMap<PathBuf, FileConfiguration> {
        &self.files
    }

    pub fn browse_path(&self) -> &BrowsePath {
        &self.browse_path
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl<'a> FromIterator<&'a CompileUnit> for ConfigurationProvider {
    fn from_iter<T: IntoIterator<Item = &'a CompileUnit>>(units: T) -> Self {
        let mut result = Self::new();
        for unit in units {
            result.apply(unit);
        }
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::semantic::{Architecture, Language, ToolchainFamily};
    use proptest::prelude::*;

    fn unit(sources: &[&str], includes: &[&str], define: &str) -> CompileUnit {
        CompileUnit {
            defines: vec![define.to_string()],
            include_paths: includes.iter().map(PathBuf::from).collect(),
            forced_includes: vec![PathBuf::from("/w/config/force.h")],
            language_standard: Some(Standard::default_for(Language::C)),
            toolchain_mode: ToolchainMode::new(ToolchainFamily::Gcc, Architecture::X64),
            compiler_full_path: PathBuf::from("/usr/bin/gcc"),
            source_files: sources.iter().map(PathBuf::from).collect(),
            platform_sdk_version: None,
            language: Some(Language::C),
        }
    }

    #[test]
    fn test_apply() {
        let mut sut = ConfigurationProvider::new();
        sut.apply(&unit(&["/w/src/a.c", "/w/lib/b.c"], &["/w/include"], "A"));

        assert_eq!(sut.files().len(), 2);
        assert_eq!(sut.get(Path::new("/w/src/a.c")).map(|c| c.defines.clone()), Some(vec!["A".to_string()]));
        assert_eq!(
            sut.browse_path().entries(),
            &[PathBuf::from("/w/include"), PathBuf::from("/w/config"), PathBuf::from("/w/src"), PathBuf::from("/w/lib")]
        );
    }

    #[test]
    fn test_last_write_wins() {
        let mut sut = ConfigurationProvider::new();
        sut.apply(&unit(&["/w/a.c"], &[], "FIRST"));
        sut.apply(&unit(&["/w/a.c"], &[], "SECOND"));

        assert_eq!(sut.get(Path::new("/w/a.c")).map(|c| c.defines.clone()), Some(vec!["SECOND".to_string()]));
    }

    #[test]
    fn test_replace_and_merge() {
        let old: ConfigurationProvider = [unit(&["/w/a.c"], &["/w/old"], "OLD")].iter().collect();
        let new: ConfigurationProvider = [unit(&["/w/b.c"], &["/w/new"], "NEW")].iter().collect();

        let mut merged = old.clone();
        merged.update(&new, MergeMode::Merge);
        assert_eq!(merged.files().len(), 2);
        assert!(merged.browse_path().entries().contains(&PathBuf::from("/w/old")));
        assert!(merged.browse_path().entries().contains(&PathBuf::from("/w/new")));

        let mut replaced = old.clone();
        replaced.update(&new, MergeMode::Replace);
        assert_eq!(replaced, new);
    }

    #[test]
    fn test_browse_path_serialized_as_list() {
        let sut = BrowsePath::from(vec![PathBuf::from("/a"), PathBuf::from("/b"), PathBuf::from("/a")]);

        let json = serde_json::to_string(&sut).unwrap();
        assert_eq!(json, r#"["/a","/b"]"#);
        assert_eq!(serde_json::from_str::<BrowsePath>(&json).unwrap(), sut);
    }

    fn arbitrary_unit() -> impl Strategy<Value = CompileUnit> {
        (
            proptest::collection::vec("[a-c]{1,2}\\.c", 1..3),
            proptest::collection::vec("[x-z]{1,2}", 0..3),
            "[A-Z]{1,3}",
        )
            .prop_map(|(sources, includes, define)| {
                let sources: Vec<String> = sources.iter().map(|s| format!("/w/{s}")).collect();
                let includes: Vec<String> = includes.iter().map(|i| format!("/w/{i}")).collect();
                let sources: Vec<&str> = sources.iter().map(String::as_str).collect();
                let includes: Vec<&str> = includes.iter().map(String::as_str).collect();
                unit(&sources, &includes, &define)
            })
    }

    proptest! {
        #[test]
        fn merge_is_idempotent(
            existing in proptest::collection::vec(arbitrary_unit(), 0..5),
            units in proptest::collection::vec(arbitrary_unit(), 0..5),
        ) {
            let pass: ConfigurationProvider = units.iter().collect();
            let mut once: ConfigurationProvider = existing.iter().collect();
            once.update(&pass, MergeMode::Merge);
            let mut twice = once.clone();
            twice.update(&pass, MergeMode::Merge);

            prop_assert_eq!(once, twice);
        }

        #[test]
        fn state_equals_replay_since_last_replace(
            before in proptest::collection::vec(arbitrary_unit(), 0..5),
            after in proptest::collection::vec(arbitrary_unit(), 0..5),
            increments in proptest::collection::vec(proptest::collection::vec(arbitrary_unit(), 0..3), 0..3),
        ) {
            let mut sut: ConfigurationProvider = before.iter().collect();
            sut.update(&after.iter().collect(), MergeMode::Replace);
            for increment in &increments {
                sut.update(&increment.iter().collect(), MergeMode::Merge);
            }

            let replay: ConfigurationProvider =
                after.iter().chain(increments.iter().flatten()).collect();
            prop_assert_eq!(sut.files(), replay.files());
            let mut expected: Vec<_> = replay.browse_path().entries().to_vec();
            let mut actual: Vec<_> = sut.browse_path().entries().to_vec();
            expected.sort();
            actual.sort();
            prop_assert_eq!(actual, expected);
        }
    }
}
