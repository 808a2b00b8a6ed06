// SPDX-License-Identifier: GPL-3.0-or-later

//! Tracking of the working directory across a dry-run trace.
//!
//! The commands in a trace are relative to the directory make was in when it
//! printed them. With `--print-directory` make announces the directory changes
//! of recursive invocations, and the recipes themselves change directories
//! with the usual shell idioms. Both are recognized here.

use super::make_full_path;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static ENTERING_DIRECTORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Entering directory [`'"](.*)[`'"]"#).expect("Invalid regex pattern")
});

static CHANGE_DIRECTORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^cd\s+(.+)$").expect("Invalid regex pattern"));

static PUSH_DIRECTORY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^pushd\s+(.+)$").expect("Invalid regex pattern"));

/// A non-empty stack of absolute directories, the top is the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryHistory {
    entries: Vec<PathBuf>,
}

impl DirectoryHistory {
    pub fn new(root: &Path) -> Self {
        Self { entries: vec![root.to_path_buf()] }
    }

    pub fn current(&self) -> &Path {
        // The history is never empty.
        self.entries.last().map(PathBuf::as_path).unwrap_or(Path::new("/"))
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Resets the history to the root only.
    pub fn reset(&mut self, root: &Path) {
        self.entries = vec![root.to_path_buf()];
    }

    /// Updates the history when the line changes the directory.
    ///
    /// Returns true when the line was recognized as a directory change.
    pub fn apply(&mut self, line: &str) -> bool {
        let line = line.trim();

        if line == "cd -" {
            let length = self.entries.len();
            if length >= 2 {
                self.entries.swap(length - 1, length - 2);
            }
            return true;
        }
        if line == "popd" || line.contains("Leaving directory") {
            if self.entries.len() > 1 {
                self.entries.pop();
            }
            return true;
        }
        if let Some(captures) = CHANGE_DIRECTORY.captures(line) {
            let previous = self.current().to_path_buf();
            let next = make_full_path(&captures[1], &previous);
            self.entries = vec![previous, next];
            return true;
        }
        if let Some(captures) = PUSH_DIRECTORY.captures(line) {
            let next = make_full_path(&captures[1], self.current());
            self.entries.push(next);
            return true;
        }
        if let Some(captures) = ENTERING_DIRECTORY.captures(line) {
            let next = make_full_path(&captures[1], self.current());
            log::debug!("Entering directory: {}", next.display());
            self.entries.push(next);
            return true;
        }
        false
    }
}
