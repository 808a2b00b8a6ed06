// SPDX-License-Identifier: GPL-3.0-or-later

//! Extraction of command line switches from the arguments of an invocation.
//!
//! The arguments are split into shell-like tokens first (quoted parts stay
//! together), so a switch is only recognized at the start of a token. This
//! way a switch-like text inside a path or a quoted value is never taken as
//! a switch.
//!
//! GNU style tools take switches with `-` or `--` prefix. MSVC style tools
//! also accept the `/` prefix. The value of a switch may be glued to the name
//! (`-Iinc`), separated by `:` or `=` (`/std:c++17`, `-std=c11`), or be the
//! next token (`-I inc`).

use super::remove_quotes;
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:"[^"]*"|'[^']*'|[^\s"'])+"#).expect("Invalid regex pattern"));

/// Tools which use the MSVC command line conventions.
const MSVC_STYLE_TOOLS: [&str; 6] = ["cl", "clang-cl", "icl", "link", "lib", "lld-link"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStyle {
    Gnu,
    Msvc,
}

impl SwitchStyle {
    /// Guess the switch style from the tool name (with or without path and extension).
    pub fn of_tool(name: &str) -> Self {
        let stem = Path::new(name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if MSVC_STYLE_TOOLS.contains(&stem.as_str()) {
            SwitchStyle::Msvc
        } else {
            SwitchStyle::Gnu
        }
    }

    fn prefixes(&self) -> &'static [&'static str] {
        match self {
            SwitchStyle::Gnu => &["--", "-"],
            SwitchStyle::Msvc => &["--", "-", "/"],
        }
    }
}

/// A switch as it appeared on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOccurrence {
    pub name: String,
    pub value: Option<String>,
}

impl fmt::Display for SwitchOccurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.name, value),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Splits the arguments into tokens, keeping the quoted parts together.
pub fn tokenize(arguments: &str) -> Vec<String> {
    TOKEN.find_iter(arguments).map(|m| m.as_str().to_string()).collect()
}

/// Removes one pair of enclosing quotes.
fn unwrap_quotes(token: &str) -> &str {
    for quote in ['"', '\''] {
        if token.len() >= 2 && token.starts_with(quote) && token.ends_with(quote) {
            return &token[1..token.len() - 1];
        }
    }
    token
}

/// The switch extractors for a given tool style.
#[derive(Debug, Clone, Copy)]
pub struct Switches {
    style: SwitchStyle,
}

impl Switches {
    pub fn new(style: SwitchStyle) -> Self {
        Self { style }
    }

    pub fn for_tool(name: &str) -> Self {
        Self::new(SwitchStyle::of_tool(name))
    }

    pub fn style(&self) -> SwitchStyle {
        self.style
    }

    /// Values of every occurrence of the switch, in order of appearance.
    pub fn repeatable(&self, arguments: &str, name: &str) -> Vec<String> {
        self.occurrences(arguments, &[], &[name])
            .into_iter()
            .filter_map(|occurrence| occurrence.value)
            .collect()
    }

    /// The value of the last occurrence of any of the switch spellings.
    pub fn single(&self, arguments: &str, names: &[&str]) -> Option<String> {
        self.occurrences(arguments, &[], names)
            .into_iter()
            .filter_map(|occurrence| occurrence.value)
            .next_back()
    }

    /// Boolean and valued switches in the order they appear.
    pub fn ordered(&self, arguments: &str, simple: &[&str], valued: &[&str]) -> Vec<SwitchOccurrence> {
        self.occurrences(arguments, simple, valued)
    }

    /// True when any of the switches is present as a whole token.
    pub fn is_present(&self, arguments: &str, names: &[&str]) -> bool {
        !self.occurrences(arguments, names, &[]).is_empty()
    }

    /// The non-switch tokens which end with one of the extensions.
    ///
    /// The extensions are given without the leading dot, compared case-insensitive.
    pub fn files_by_extension(&self, arguments: &str, extensions: &[&str]) -> Vec<String> {
        let suffixes: Vec<String> = extensions.iter().map(|ext| format!(".{}", ext.to_lowercase())).collect();

        tokenize(arguments)
            .iter()
            .map(|token| unwrap_quotes(token))
            .filter(|token| !self.looks_like_switch(token) && !token.starts_with('@'))
            .map(remove_quotes)
            .filter(|token| {
                let lowercase = token.to_lowercase();
                suffixes.iter().any(|suffix| lowercase.ends_with(suffix.as_str()) && lowercase.len() > suffix.len())
            })
            .collect()
    }

    fn looks_like_switch(&self, token: &str) -> bool {
        token.starts_with('-') || (self.style == SwitchStyle::Msvc && token.starts_with('/'))
    }

    /// The switch name part of the token, and whether it was a `--` long option.
    fn strip_prefix<'a>(&self, token: &'a str) -> Option<(&'a str, bool)> {
        self.style
            .prefixes()
            .iter()
            .find_map(|prefix| token.strip_prefix(prefix).map(|rest| (rest, *prefix == "--")))
            .filter(|(rest, _)| !rest.is_empty())
    }

    fn occurrences(&self, arguments: &str, simple: &[&str], valued: &[&str]) -> Vec<SwitchOccurrence> {
        let mut names: Vec<(&str, bool)> = simple
            .iter()
            .map(|name| (*name, false))
            .chain(valued.iter().map(|name| (*name, true)))
            .filter(|(name, _)| !name.is_empty())
            .collect();
        names.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let tokens = tokenize(arguments);
        let mut result = Vec::new();
        let mut index = 0;
        while index < tokens.len() {
            let token = unwrap_quotes(&tokens[index]);
            index += 1;

            let Some((rest, long)) = self.strip_prefix(token) else {
                continue;
            };
            for (name, takes_value) in &names {
                if !takes_value {
                    if rest == *name {
                        result.push(SwitchOccurrence { name: name.to_string(), value: None });
                        break;
                    }
                    continue;
                }
                let Some(remainder) = rest.strip_prefix(name) else {
                    continue;
                };
                // Long options take the value after `=` only, `--oformat` is not `--o`.
                if long && !remainder.is_empty() && !remainder.starts_with('=') {
                    continue;
                }
                let value = if remainder.is_empty() {
                    match tokens.get(index) {
                        Some(next) => {
                            index += 1;
                            next.as_str()
                        }
                        None => break,
                    }
                } else {
                    remainder.strip_prefix([':', '=']).unwrap_or(remainder)
                };
                result.push(SwitchOccurrence { name: name.to_string(), value: Some(remove_quotes(value)) });
                break;
            }
        }
        result
    }
}
