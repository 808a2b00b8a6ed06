// SPDX-License-Identifier: GPL-3.0-or-later

//! Discovery of the programs a build produces, and of the ways they are run.
//!
//! The first pass looks at the compiler and linker lines, and deduces the
//! name of the binary each line produces. The second pass looks for the lines
//! which run any of those binaries (test runners, code generators), and takes
//! the working directory and the arguments from there.
//!
//! A launch target is identified by its canonical string form:
//! `workingDirectory>relativeBinaryPath(arg1,arg2,...)`.

use super::{LINKER_INPUT_EXTENSIONS, OBJECT_EXTENSIONS, SOURCE_EXTENSIONS, Toolset};
use crate::trace::{
    CancellationToken, Cancelled, DirectoryHistory, LineScanner, Scan, SwitchStyle, Switches, ToolInvocation,
    ToolMatcher, make_full_path, normalize,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// A program to run: the binary, the directory to run it in, and the arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct LaunchTarget {
    pub binary_path: PathBuf,
    pub working_directory: PathBuf,
    pub arguments: Vec<String>,
}

impl LaunchTarget {
    pub fn new(binary_path: PathBuf, working_directory: PathBuf, arguments: Vec<String>) -> Self {
        Self { binary_path, working_directory, arguments }
    }

    /// The identity of the target: `workingDirectory>relativeBinaryPath(args)`.
    ///
    /// A binary outside of the working directory is given with `..` steps. It
    /// stays absolute when there is no relative path (other drive, same path).
    pub fn canonical(&self) -> String {
        let binary = relative_path(&self.binary_path, &self.working_directory)
            .unwrap_or_else(|| self.binary_path.clone());
        format!("{}>{}({})", self.working_directory.display(), binary.display(), self.arguments.join(","))
    }
}

/// The path relative to the base directory, both taken lexically.
fn relative_path(path: &Path, base: &Path) -> Option<PathBuf> {
    let path: Vec<Component> = path.components().collect();
    let base: Vec<Component> = base.components().collect();
    // different roots (or drives) have no relative path
    match (path.first(), base.first()) {
        (Some(left), Some(right)) if left == right => {}
        _ => return None,
    }

    let common = path.iter().zip(base.iter()).take_while(|(left, right)| left == right).count();
    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &path[common..] {
        relative.push(component.as_os_str());
    }
    if relative.as_os_str().is_empty() { None } else { Some(relative) }
}

impl fmt::Display for LaunchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchTargetError {
    #[error("Missing '>' after the working directory: {0}")]
    MissingSeparator(String),
    #[error("Missing argument list: {0}")]
    MissingArguments(String),
    #[error("Missing binary path: {0}")]
    MissingBinary(String),
}

impl FromStr for LaunchTarget {
    type Err = LaunchTargetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (directory, rest) =
            value.split_once('>').ok_or_else(|| LaunchTargetError::MissingSeparator(value.to_string()))?;
        let rest = rest
            .strip_suffix(')')
            .ok_or_else(|| LaunchTargetError::MissingArguments(value.to_string()))?;

        // The argument list opens at the parenthesis which balances the last one.
        let mut depth = 0usize;
        let mut open = None;
        for (index, c) in rest.char_indices().rev() {
            match c {
                ')' => depth += 1,
                '(' if depth == 0 => {
                    open = Some(index);
                    break;
                }
                '(' => depth -= 1,
                _ => {}
            }
        }
        let open = open.ok_or_else(|| LaunchTargetError::MissingArguments(value.to_string()))?;
        let (binary, arguments) = (&rest[..open], &rest[open + 1..]);
        if binary.is_empty() {
            return Err(LaunchTargetError::MissingBinary(value.to_string()));
        }

        let working_directory = PathBuf::from(directory);
        let binary_path = normalize(&working_directory.join(binary));
        let arguments =
            if arguments.is_empty() { vec![] } else { arguments.split(',').map(str::to_string).collect() };
        Ok(Self { binary_path, working_directory, arguments })
    }
}

impl From<LaunchTarget> for String {
    fn from(target: LaunchTarget) -> Self {
        target.canonical()
    }
}

impl TryFrom<String> for LaunchTarget {
    type Error = LaunchTargetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Removes the targets with an already seen canonical form, keeps the order.
pub fn deduplicate(targets: impl IntoIterator<Item = LaunchTarget>) -> Vec<LaunchTarget> {
    let mut seen = HashSet::new();
    targets.into_iter().filter(|target| seen.insert(target.canonical())).collect()
}

/// Shell tokens which end the arguments of a program.
const REDIRECTIONS: [&str; 6] = [">", "1>", "2>", "|", "<", "&>"];

/// Recognizes the binaries and their invocations in a trace.
pub struct LaunchTargetExtractor {
    compilers: ToolMatcher,
    linkers: ToolMatcher,
    root: PathBuf,
    extension: String,
}

impl LaunchTargetExtractor {
    pub fn new(toolset: &Toolset, root: &Path) -> Self {
        Self::with_executable_extension(toolset, root, std::env::consts::EXE_EXTENSION)
    }

    pub fn with_executable_extension(toolset: &Toolset, root: &Path, extension: &str) -> Self {
        Self {
            compilers: ToolMatcher::with_extension(&toolset.compilers, true, extension),
            linkers: ToolMatcher::with_extension(&toolset.linkers, true, extension),
            root: root.to_path_buf(),
            extension: extension.to_string(),
        }
    }

    /// Pass one: the binaries the compiler and linker lines produce.
    pub fn binaries<'s>(
        &'s self,
        trace: &'s str,
        cancel: &CancellationToken,
        chunk_size: usize,
    ) -> Scan<'s, BinaryScanner<'s>> {
        let scanner = BinaryScanner { extractor: self, history: DirectoryHistory::new(&self.root) };
        Scan::new(trace, scanner, cancel, chunk_size)
    }

    /// Pass two: the lines which run one of the binaries.
    pub fn invocations<'s>(
        &'s self,
        trace: &'s str,
        binaries: &[LaunchTarget],
        cancel: &CancellationToken,
        chunk_size: usize,
    ) -> Scan<'s, InvocationScanner> {
        let dotted = format!(".{}", self.extension);
        let names: HashSet<String> = binaries
            .iter()
            .filter_map(|target| target.binary_path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .map(|name| {
                if !self.extension.is_empty() {
                    if let Some(stem) = name.strip_suffix(dotted.as_str()) {
                        return stem.to_string();
                    }
                }
                name
            })
            .collect();
        let matcher = ToolMatcher::with_extension(names, false, &self.extension)
            .with_known_paths(binaries.iter().map(|target| target.binary_path.clone()));

        let scanner = InvocationScanner { matcher, history: DirectoryHistory::new(&self.root) };
        Scan::new(trace, scanner, cancel, chunk_size)
    }

    /// Runs both passes, returns the unique targets.
    pub fn extract(
        &self,
        trace: &str,
        cancel: &CancellationToken,
        chunk_size: usize,
    ) -> Result<Vec<LaunchTarget>, Cancelled> {
        let binaries = deduplicate(self.binaries(trace, cancel, chunk_size).complete()?);
        if binaries.is_empty() {
            log::debug!("No binaries found, the invocation pass is skipped.");
            return Ok(binaries);
        }
        let invocations = self.invocations(trace, &binaries, cancel, chunk_size).complete()?;
        Ok(deduplicate(binaries.into_iter().chain(invocations)))
    }

    /// The binary a line produces, in the given directory.
    pub fn binary_of(&self, line: &str, current_dir: &Path) -> Option<PathBuf> {
        let from_compiler = self
            .compilers
            .matches(line, current_dir)
            .and_then(|invocation| self.compiler_output(&invocation));

        if let Some(invocation) = self.linkers.matches(line, current_dir) {
            if from_compiler.is_some() {
                log::debug!("Line produces a binary by the compiler, linker rules skipped: {line}");
            } else {
                return self.linker_output(&invocation).map(|name| make_full_path(&name, current_dir));
            }
        }
        from_compiler.map(|name| make_full_path(&name, current_dir))
    }

    fn compiler_output(&self, invocation: &ToolInvocation) -> Option<String> {
        let switches = Switches::for_tool(&invocation.tool_name);
        let arguments = invocation.arguments.as_str();

        // compile only, or a library
        if switches.is_present(arguments, &["c", "E", "S", "shared", "LD", "LDd"]) {
            return None;
        }
        let sources = switches.files_by_extension(arguments, &SOURCE_EXTENSIONS);
        if sources.is_empty() && switches.files_by_extension(arguments, &OBJECT_EXTENSIONS).is_empty() {
            return None;
        }

        match switches.style() {
            SwitchStyle::Msvc => switches
                .single(arguments, &["Fe"])
                .map(|name| with_default_extension(name, "exe"))
                .or_else(|| {
                    switches
                        .repeatable(arguments, "Fo")
                        .first()
                        .and_then(|object| file_stem(object))
                        .map(|stem| format!("{stem}.exe"))
                })
                .or_else(|| sources.first().and_then(|source| file_stem(source)).map(|stem| format!("{stem}.exe"))),
            SwitchStyle::Gnu => switches.single(arguments, &["o"]).or_else(|| Some(self.default_binary_name())),
        }
    }

    fn linker_output(&self, invocation: &ToolInvocation) -> Option<String> {
        let switches = Switches::for_tool(&invocation.tool_name);
        let arguments = invocation.arguments.as_str();

        if switches.is_present(arguments, &["c", "E", "S", "r", "shared", "dll", "DLL", "lib", "LIB"]) {
            return None;
        }
        // `/o` is not a linker switch, and would match `/opt:ref` or `/order:@file`.
        let (extension, output) = match switches.style() {
            SwitchStyle::Msvc => ("exe", "out"),
            SwitchStyle::Gnu => (self.extension.as_str(), "o"),
        };
        switches
            .single(arguments, &[output])
            .or_else(|| {
                switches
                    .files_by_extension(arguments, &LINKER_INPUT_EXTENSIONS)
                    .first()
                    .and_then(|input| file_stem(input))
                    .map(|stem| if extension.is_empty() { stem } else { format!("{stem}.{extension}") })
            })
            .or_else(|| match switches.style() {
                SwitchStyle::Msvc => Some("a.exe".to_string()),
                SwitchStyle::Gnu => Some(self.default_binary_name()),
            })
    }

    fn default_binary_name(&self) -> String {
        if self.extension.is_empty() { "a.out".to_string() } else { format!("a.{}", self.extension) }
    }
}

fn file_stem(path: &str) -> Option<String> {
    Path::new(path).file_stem().map(|stem| stem.to_string_lossy().into_owned())
}

fn with_default_extension(name: String, extension: &str) -> String {
    if Path::new(&name).extension().is_some() { name } else { format!("{name}.{extension}") }
}

/// Line scanner of the pass one.
pub struct BinaryScanner<'s> {
    extractor: &'s LaunchTargetExtractor,
    history: DirectoryHistory,
}

impl LineScanner for BinaryScanner<'_> {
    type Item = LaunchTarget;

    fn scan_line(&mut self, line: &str, found: &mut Vec<LaunchTarget>) {
        if self.history.apply(line) {
            return;
        }
        if let Some(binary) = self.extractor.binary_of(line, self.history.current()) {
            log::debug!("Binary found: {}", binary.display());
            found.push(LaunchTarget::new(binary, self.extractor.root.clone(), vec![]));
        }
    }
}

/// Line scanner of the pass two.
pub struct InvocationScanner {
    matcher: ToolMatcher,
    history: DirectoryHistory,
}

impl LineScanner for InvocationScanner {
    type Item = LaunchTarget;

    fn scan_line(&mut self, line: &str, found: &mut Vec<LaunchTarget>) {
        if self.history.apply(line) {
            return;
        }
        if let Some(invocation) = self.matcher.matches(line, self.history.current()) {
            let arguments = invocation
                .arguments
                .split_whitespace()
                .take_while(|token| !REDIRECTIONS.iter().any(|redirection| token.starts_with(redirection)))
                .map(str::to_string)
                .collect();
            let target =
                LaunchTarget::new(invocation.full_path, self.history.current().to_path_buf(), arguments);
            log::debug!("Binary invocation found: {target}");
            found.push(target);
        }
    }
}
