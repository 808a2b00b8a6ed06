// SPDX-License-Identifier: GPL-3.0-or-later

//! Build target names from a make database dump (`make --print-data-base`).
//!
//! The dump lists the rules in the sections between `# Files` and
//! `# Finished Make data base`. A rule line starts with the target name
//! followed by a colon. Files make only knows about (and did not find a rule
//! for) are annotated with `# Not a target:` on the line before.

use crate::trace::{CancellationToken, Cancelled, LineScanner, Scan};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\s:#=%]+)::?(?:[^=]|$)").expect("Invalid regex pattern"));

const SECTION_START: &str = "# Files";
const SECTION_END: &str = "# Finished Make data base";
const NOT_A_TARGET: &str = "# Not a target:";

#[derive(Debug, Default)]
pub struct BuildTargetExtractor {
    in_section: bool,
    not_a_target: bool,
    continued: bool,
    seen: HashSet<String>,
}

impl BuildTargetExtractor {
    /// The target names of the dump in order of first appearance.
    pub fn scan<'a>(dump: &'a str, cancel: &CancellationToken, chunk_size: usize) -> Scan<'a, Self> {
        Scan::new(dump, Self::default(), cancel, chunk_size)
    }

    pub fn extract(dump: &str, cancel: &CancellationToken, chunk_size: usize) -> Result<Vec<String>, Cancelled> {
        Self::scan(dump, cancel, chunk_size).complete()
    }
}

impl LineScanner for BuildTargetExtractor {
    type Item = String;

    fn scan_line(&mut self, line: &str, found: &mut Vec<String>) {
        let continued = std::mem::replace(&mut self.continued, line.trim_end().ends_with('\\'));

        if line.starts_with(SECTION_START) {
            self.in_section = true;
            self.not_a_target = false;
            return;
        }
        if line.starts_with(SECTION_END) {
            self.in_section = false;
            return;
        }
        if !self.in_section || continued || line.trim().is_empty() {
            return;
        }
        if line.starts_with(NOT_A_TARGET) {
            self.not_a_target = true;
            return;
        }
        if std::mem::take(&mut self.not_a_target) {
            return;
        }
        if line.starts_with('#') || line.starts_with(char::is_whitespace) {
            return;
        }

        let Some(captures) = TARGET.captures(line) else {
            return;
        };
        let name = &captures[1];
        if name.starts_with('.') {
            return;
        }
        if self.seen.insert(name.to_string()) {
            log::debug!("Build target found: {name}");
            found.push(name.to_string());
        }
    }
}
