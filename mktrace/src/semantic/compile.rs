// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-file compiler configuration from the compiler invocations of a trace.
//!
//! Every line of the trace which invokes a known compiler with source files
//! produces compile units. A compile unit tells how the listed source files
//! are compiled: the preprocessor defines, the include paths, the language
//! standard and the toolchain mode.
//!
//! An invocation which compiles C and C++ files together produces one unit per
//! language, since the standard defaults differ by language.

use super::standard::Standard;
use super::toolchain::{Architecture, ToolchainMode, ToolchainRecognizer, parse_architecture};
use super::{Language, SOURCE_EXTENSIONS, Toolset};
use crate::context::SearchPath;
use crate::trace::{
    CancellationToken, DirectoryHistory, LineScanner, Scan, Switches, ToolInvocation, ToolMatcher,
    make_full_path,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The compiler configuration of a group of source files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileUnit {
    pub defines: Vec<String>,
    pub include_paths: Vec<PathBuf>,
    pub forced_includes: Vec<PathBuf>,
    pub language_standard: Option<Standard>,
    pub toolchain_mode: ToolchainMode,
    pub compiler_full_path: PathBuf,
    pub source_files: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_sdk_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

/// Recognizes the compiler invocations and builds the compile units.
pub struct CompileUnitExtractor<'a> {
    matcher: ToolMatcher,
    recognizer: ToolchainRecognizer,
    search_path: &'a dyn SearchPath,
    root: PathBuf,
    allow_gnu: bool,
    platform_sdk_version: Option<String>,
}

impl<'a> CompileUnitExtractor<'a> {
    pub fn new(toolset: &Toolset, search_path: &'a dyn SearchPath, root: &Path) -> Self {
        Self {
            matcher: ToolMatcher::decorated(&toolset.compilers),
            recognizer: ToolchainRecognizer::new(),
            search_path,
            root: root.to_path_buf(),
            allow_gnu: true,
            platform_sdk_version: None,
        }
    }

    /// Uses the executable extension instead of the host's one.
    pub fn with_executable_extension(mut self, toolset: &Toolset, extension: &str) -> Self {
        self.matcher = ToolMatcher::with_extension(&toolset.compilers, true, extension);
        self
    }

    /// Whether the consumer understands the GNU dialect standard tokens.
    pub fn with_gnu_standards(mut self, allow: bool) -> Self {
        self.allow_gnu = allow;
        self
    }

    pub fn with_platform_sdk_version(mut self, version: Option<String>) -> Self {
        self.platform_sdk_version = version;
        self
    }

    /// The compile units of the trace, produced lazily.
    pub fn scan<'s>(
        &'s self,
        trace: &'s str,
        cancel: &CancellationToken,
        chunk_size: usize,
    ) -> Scan<'s, CompileScanner<'s>> {
        let scanner = CompileScanner { extractor: self, history: DirectoryHistory::new(&self.root) };
        Scan::new(trace, scanner, cancel, chunk_size)
    }

    /// The compile units of a single line, executed in the given directory.
    pub fn extract(&self, line: &str, current_dir: &Path) -> Vec<CompileUnit> {
        let Some(invocation) = self.matcher.matches(line, current_dir) else {
            return vec![];
        };
        let switches = Switches::for_tool(&invocation.tool_name);
        let arguments = invocation.arguments.as_str();

        let sources = switches.files_by_extension(arguments, &SOURCE_EXTENSIONS);
        if sources.is_empty() {
            log::debug!("Compiler invocation without source files: {line}");
            return vec![];
        }

        let compiler = self.compiler_path(&invocation);
        let include_paths = switches
            .ordered(arguments, &[], &["I", "isystem", "iquote", "idirafter"])
            .into_iter()
            .filter_map(|switch| switch.value)
            .map(|value| make_full_path(&value, current_dir))
            .collect::<Vec<_>>();
        let forced_includes = switches
            .ordered(arguments, &[], &["FI", "include"])
            .into_iter()
            .filter_map(|switch| switch.value)
            .map(|value| make_full_path(&value, current_dir))
            .collect::<Vec<_>>();
        let defines = switches.repeatable(arguments, "D");
        let architecture = target_architecture(&switches, arguments);
        let toolchain_mode = self.recognizer.mode(&compiler, architecture);
        let forced_language = forced_language(&switches, arguments);
        let standard = switches.single(arguments, &["std"]);

        let mut groups: Vec<(Language, Vec<PathBuf>)> = Vec::new();
        for source in sources {
            let path = make_full_path(&source, current_dir);
            let Some(language) = forced_language.or_else(|| Language::from_path(&path)) else {
                continue;
            };
            match groups.iter_mut().find(|(group, _)| *group == language) {
                Some((_, files)) => files.push(path),
                None => groups.push((language, vec![path])),
            }
        }

        groups
            .into_iter()
            .map(|(language, source_files)| {
                let unit = CompileUnit {
                    defines: defines.clone(),
                    include_paths: include_paths.clone(),
                    forced_includes: forced_includes.clone(),
                    language_standard: Some(Standard::resolve(standard.as_deref(), language, self.allow_gnu)),
                    toolchain_mode,
                    compiler_full_path: compiler.clone(),
                    source_files,
                    platform_sdk_version: self.platform_sdk_version.clone(),
                    language: Some(language),
                };
                log::debug!("Compile unit found: {unit:?}");
                unit
            })
            .collect()
    }

    fn compiler_path(&self, invocation: &ToolInvocation) -> PathBuf {
        if invocation.found {
            return invocation.full_path.clone();
        }
        let name = invocation.file_name();
        self.search_path.find(&name).unwrap_or_else(|| PathBuf::from(name))
    }
}

/// The target architecture by the last recognized architecture switch.
fn target_architecture(switches: &Switches, arguments: &str) -> Option<Architecture> {
    switches
        .ordered(arguments, &["m32", "m64"], &["target", "march", "arch"])
        .into_iter()
        .fold(None, |current, switch| {
            let next = match (switch.name.as_str(), switch.value) {
                ("m32", _) => Some(Architecture::X86),
                ("m64", _) => Some(Architecture::X64),
                (_, Some(value)) => parse_architecture(&value),
                _ => None,
            };
            next.or(current)
        })
}

/// The language all source files are compiled as, when the command line says so.
fn forced_language(switches: &Switches, arguments: &str) -> Option<Language> {
    switches
        .ordered(arguments, &["TC", "TP"], &["x"])
        .into_iter()
        .fold(None, |current, switch| match (switch.name.as_str(), switch.value.as_deref()) {
            ("TC", _) => Some(Language::C),
            ("TP", _) => Some(Language::Cpp),
            (_, Some("c" | "c-header")) => Some(Language::C),
            (_, Some("c++" | "c++-header")) => Some(Language::Cpp),
            (_, Some("none")) => None,
            _ => current,
        })
}

/// Line scanner of the compile units, which follows the directory changes.
pub struct CompileScanner<'s> {
    extractor: &'s CompileUnitExtractor<'s>,
    history: DirectoryHistory,
}

impl LineScanner for CompileScanner<'_> {
    type Item = CompileUnit;

    fn scan_line(&mut self, line: &str, found: &mut Vec<CompileUnit>) {
        if self.history.apply(line) {
            return;
        }
        found.extend(self.extractor.extract(line, self.history.current()));
    }
}
