// SPDX-License-Identifier: GPL-3.0-or-later

//! Language standard tokens.
//!
//! Compilers accept many spellings for the same standard (`c++1z`, `c++17`,
//! `/std:c++17`). The consumers want one canonical token per standard, and
//! may or may not understand the GNU dialects.

use super::Language;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A canonical language standard, like `c17` or `gnu++20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Standard {
    pub language: Language,
    /// The two digit year of the standard.
    pub version: u8,
    pub gnu: bool,
}

impl Standard {
    pub fn new(language: Language, version: u8, gnu: bool) -> Self {
        Self { language, version, gnu }
    }

    /// The standard used when the command line does not name one.
    pub fn default_for(language: Language) -> Self {
        Self::new(language, 17, false)
    }

    /// Interprets a standard token from the command line.
    ///
    /// When the language is known, only the standards of that language are
    /// accepted. GNU dialects are mapped to the plain standard unless the
    /// consumer understands them.
    pub fn parse(token: &str, language: Option<Language>, allow_gnu: bool) -> Option<Self> {
        let token = token.trim().to_lowercase();
        let (gnu, rest) = if let Some(rest) = token.strip_prefix("gnu") {
            (true, rest)
        } else if let Some(rest) = token.strip_prefix("iso9899:") {
            (false, rest)
        } else if let Some(rest) = token.strip_prefix('c') {
            (false, rest)
        } else {
            return None;
        };

        let standard = match rest.strip_prefix("++") {
            Some(version) => cpp_version(version).map(|version| Self::new(Language::Cpp, version, gnu)),
            None => c_version(rest).map(|version| Self::new(Language::C, version, gnu)),
        }?;

        if language.is_some_and(|language| language != standard.language) {
            return None;
        }
        Some(Self { gnu: standard.gnu && allow_gnu, ..standard })
    }

    /// The standard for the files of the language: the parsed token, or the
    /// default when there was no token or it was not recognized.
    pub fn resolve(token: Option<&str>, language: Language, allow_gnu: bool) -> Self {
        match token {
            None => Self::default_for(language),
            Some(token) => Self::parse(token, Some(language), allow_gnu).unwrap_or_else(|| {
                log::warn!("Unrecognized language standard '{token}' for {language:?}, using the default.");
                Self::default_for(language)
            }),
        }
    }
}

fn cpp_version(version: &str) -> Option<u8> {
    match version {
        "98" => Some(98),
        "03" => Some(3),
        "11" | "0x" => Some(11),
        "14" | "1y" => Some(14),
        "17" | "1z" => Some(17),
        "20" | "2a" => Some(20),
        "23" | "2b" | "latest" => Some(23),
        _ => None,
    }
}

fn c_version(version: &str) -> Option<u8> {
    match version {
        "89" | "90" | "1990" | "199409" => Some(89),
        "99" | "9x" | "1999" => Some(99),
        "11" | "1x" | "2011" => Some(11),
        "17" | "18" | "2017" | "2018" => Some(17),
        "23" | "2x" | "latest" => Some(23),
        _ => None,
    }
}

impl fmt::Display for Standard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dialect = if self.gnu { "gnu" } else { "c" };
        match self.language {
            Language::C => write!(f, "{dialect}{:02}", self.version),
            // there is no `c++` in front of the GNU dialect
            Language::Cpp if self.gnu => write!(f, "gnu++{:02}", self.version),
            Language::Cpp => write!(f, "c++{:02}", self.version),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unrecognized language standard: {0}")]
pub struct StandardError(String);

impl FromStr for Standard {
    type Err = StandardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value, None, true).ok_or_else(|| StandardError(value.to_string()))
    }
}

impl From<Standard> for String {
    fn from(standard: Standard) -> Self {
        standard.to_string()
    }
}

impl TryFrom<String> for Standard {
    type Error = StandardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
