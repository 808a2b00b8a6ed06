// SPDX-License-Identifier: GPL-3.0-or-later

//! This module contains the line level machinery of the dry-run trace parser.
//!
//! A dry-run trace is the text `make --dry-run` prints: one shell command per
//! line, mixed with make's own announcements. The parser never executes these
//! commands, it only recognizes them.
//!
//! The building blocks are:
//! - `scan`: chunked, cancellable iteration over the lines of a trace,
//! - `directory`: tracking the working directory across the trace,
//! - `invocation`: recognizing the invocation of a named tool on a line,
//! - `switches`: extracting command line switches from the tool arguments,
//! - `preprocess`: normalizing the raw trace before the structural parsing.

pub mod directory;
pub mod invocation;
pub mod preprocess;
pub mod scan;
pub mod switches;

use std::path::{Component, Path, PathBuf};

pub use directory::DirectoryHistory;
pub use invocation::{ToolInvocation, ToolMatcher};
pub use scan::{CancellationToken, Cancelled, LineScanner, Scan, ScanState};
pub use switches::{SwitchOccurrence, SwitchStyle, Switches};

/// Removes every single and double quote character from the text.
///
/// Paths in the trace are quoted in various ways (`"C:/Program Files"/cl.exe`,
/// `'/opt/x'`), none of the quotes are part of the path itself.
pub fn remove_quotes(text: &str) -> String {
    text.chars().filter(|c| *c != '"' && *c != '\'').collect()
}

/// Makes the path absolute against the base directory, and normalizes it
/// lexically (removes `.` and `..` components). The file system is not touched.
pub fn make_full_path(path: &str, base: &Path) -> PathBuf {
    let unquoted = remove_quotes(path.trim());
    let candidate = Path::new(&unquoted);
    if candidate.is_absolute() {
        normalize(candidate)
    } else {
        normalize(&base.join(candidate))
    }
}

/// Lexical normalization of a path.
///
/// A `..` component pops the previous normal component, but never climbs above
/// the root or a prefix.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => result.push(".."),
            },
            other => result.push(other.as_os_str()),
        }
    }
    result
}
