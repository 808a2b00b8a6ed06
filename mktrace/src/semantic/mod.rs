// SPDX-License-Identifier: GPL-3.0-or-later

//! This module gives meaning to the recognized trace lines.
//!
//! The extractors in here combine the line level machinery of the `trace`
//! module into the items the consumers are interested in:
//! - `compile`: per-file compiler configuration from the compiler invocations,
//! - `launch`: the binaries the build produces, and the ways they are run,
//! - `targets`: the target names of a make database dump.
//!
//! The supporting modules are `toolchain` (compiler family and architecture)
//! and `standard` (language standard tokens).

pub mod compile;
pub mod launch;
pub mod standard;
pub mod targets;
pub mod toolchain;

use serde::{Deserialize, Serialize};
use std::path::Path;

pub use compile::{CompileUnit, CompileUnitExtractor};
pub use launch::{LaunchTarget, LaunchTargetExtractor};
pub use standard::Standard;
pub use targets::BuildTargetExtractor;
pub use toolchain::{Architecture, ToolchainFamily, ToolchainMode, ToolchainRecognizer};

/// File extensions of the C and C++ sources (compared case-insensitive).
pub const SOURCE_EXTENSIONS: [&str; 6] = ["c", "cpp", "cc", "cxx", "c++", "cp"];

/// File extensions of object files.
pub const OBJECT_EXTENSIONS: [&str; 2] = ["o", "obj"];

/// File extensions of linker inputs (objects and static libraries).
pub const LINKER_INPUT_EXTENSIONS: [&str; 4] = ["o", "obj", "lib", "a"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cpp,
}

impl Language {
    /// Language of a source file by its extension.
    ///
    /// Upper case `.C` is C++, like the GNU compilers take it.
    pub fn from_extension(extension: &str) -> Option<Self> {
        if extension == "C" {
            return Some(Language::Cpp);
        }
        match extension.to_lowercase().as_str() {
            "c" => Some(Language::C),
            "cpp" | "cc" | "cxx" | "c++" | "cp" => Some(Language::Cpp),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|ext| ext.to_str()).and_then(Self::from_extension)
    }
}

#[rustfmt::skip]
const DEFAULT_COMPILERS: [&str; 16] = [
    "clang-cl", "clang-cpp", "clang++", "clang", "armclang",
    "gcc", "g++", "cpp", "xgcc", "xg++", "cc", "c++",
    "icc", "icl", "cl", "tcc",
];

#[rustfmt::skip]
const DEFAULT_LINKERS: [&str; 13] = [
    "ilink", "link", "lld-link", "ld", "ld.lld", "ld.gold",
    "gcc", "g++", "clang", "clang++", "clang-cl", "cc", "c++",
];

/// The tool names the extractors look for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolset {
    pub compilers: Vec<String>,
    pub linkers: Vec<String>,
}

impl Default for Toolset {
    fn default() -> Self {
        Self::new(&[], &[], &[])
    }
}

impl Toolset {
    /// The default tool names extended with the additional ones, and without
    /// the excluded ones.
    pub fn new(compilers: &[String], linkers: &[String], exclude: &[String]) -> Self {
        let build = |defaults: &[&str], additional: &[String]| {
            let mut names: Vec<String> = Vec::new();
            for name in defaults.iter().map(|name| name.to_string()).chain(additional.iter().cloned()) {
                if !names.contains(&name) && !exclude.contains(&name) {
                    names.push(name);
                }
            }
            names
        };
        Self { compilers: build(&DEFAULT_COMPILERS, compilers), linkers: build(&DEFAULT_LINKERS, linkers) }
    }
}
