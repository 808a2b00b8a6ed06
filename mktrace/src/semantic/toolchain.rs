// SPDX-License-Identifier: GPL-3.0-or-later

//! Recognition of the toolchain mode of a compiler.
//!
//! The code-intelligence consumers need to know which compiler family and
//! which target architecture a file is compiled for. The family comes from
//! the compiler executable name, the architecture from the switches, from the
//! cross compiler prefix, or from the MSVC installation layout (where the
//! target architecture is the name of the directory the compiler is in).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    X86,
    X64,
    Arm,
    Arm64,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Architecture::X86 => "x86",
            Architecture::X64 => "x64",
            Architecture::Arm => "arm",
            Architecture::Arm64 => "arm64",
        };
        write!(f, "{name}")
    }
}

/// Interprets an architecture name, a target triple or a `-march` value.
///
/// Returns `None` for values which do not name an architecture (`native`, `avx2`).
pub fn parse_architecture(value: &str) -> Option<Architecture> {
    let value = value.trim().to_lowercase();
    if value == "x86-64" {
        return Some(Architecture::X64);
    }
    let value = value.strip_prefix("host").unwrap_or(&value);
    let head = value.split('-').next().unwrap_or_default();

    // `x86_arm` style directory names: host and target architecture
    architecture_of(head).or_else(|| head.rsplit_once('_').and_then(|(_, target)| architecture_of(target)))
}

fn architecture_of(name: &str) -> Option<Architecture> {
    match name {
        "x86_64" | "amd64" | "x64" => Some(Architecture::X64),
        "i386" | "i486" | "i586" | "i686" | "x86" | "ia32" => Some(Architecture::X86),
        _ if name.starts_with("aarch64") || name.starts_with("arm64") => Some(Architecture::Arm64),
        _ if name.starts_with("arm") || name.starts_with("thumb") => Some(Architecture::Arm),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolchainFamily {
    Msvc,
    Clang,
    Gcc,
}

impl fmt::Display for ToolchainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolchainFamily::Msvc => "msvc",
            ToolchainFamily::Clang => "clang",
            ToolchainFamily::Gcc => "gcc",
        };
        write!(f, "{name}")
    }
}

/// The compiler family and target architecture pair, like `gcc-x64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ToolchainMode {
    pub family: ToolchainFamily,
    pub architecture: Architecture,
}

impl ToolchainMode {
    pub fn new(family: ToolchainFamily, architecture: Architecture) -> Self {
        Self { family, architecture }
    }

    /// The mode for compilers which are not recognized.
    pub fn platform_default() -> Self {
        let family = if cfg!(target_os = "windows") {
            ToolchainFamily::Msvc
        } else if cfg!(target_os = "macos") {
            ToolchainFamily::Clang
        } else {
            ToolchainFamily::Gcc
        };
        Self::new(family, Architecture::X64)
    }
}

impl fmt::Display for ToolchainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.family, self.architecture)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unrecognized toolchain mode: {0}")]
pub struct ToolchainModeError(String);

impl FromStr for ToolchainMode {
    type Err = ToolchainModeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (family, architecture) =
            value.split_once('-').ok_or_else(|| ToolchainModeError(value.to_string()))?;
        let family = match family {
            "msvc" => ToolchainFamily::Msvc,
            "clang" => ToolchainFamily::Clang,
            "gcc" => ToolchainFamily::Gcc,
            _ => return Err(ToolchainModeError(value.to_string())),
        };
        let architecture = match architecture {
            "x86" => Architecture::X86,
            "x64" => Architecture::X64,
            "arm" => Architecture::Arm,
            "arm64" => Architecture::Arm64,
            _ => return Err(ToolchainModeError(value.to_string())),
        };
        Ok(Self::new(family, architecture))
    }
}

impl From<ToolchainMode> for String {
    fn from(mode: ToolchainMode) -> Self {
        mode.to_string()
    }
}

impl TryFrom<String> for ToolchainMode {
    type Error = ToolchainModeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Compiler family recognition by regex patterns over the executable name.
pub struct ToolchainRecognizer {
    patterns: Vec<(ToolchainFamily, Regex)>,
}

impl ToolchainRecognizer {
    pub fn new() -> Self {
        let msvc = Regex::new(r"^(?:cl|icl)$").expect("Invalid MSVC regex pattern");
        let clang = Regex::new(r"^(?:[^/]*-)?(?:arm)?clang(?:\+\+|-cl|-cpp)?(?:-[\d.]+)?$")
            .expect("Invalid Clang regex pattern");
        let gcc = Regex::new(r"^(?:[^/]*-)?(?:gcc|g\+\+|cc|c\+\+|cpp|xgcc|xg\+\+|icc|tcc)(?:-[\d.]+)?$")
            .expect("Invalid GCC regex pattern");

        Self {
            patterns: vec![
                (ToolchainFamily::Msvc, msvc),
                (ToolchainFamily::Clang, clang),
                (ToolchainFamily::Gcc, gcc),
            ],
        }
    }

    /// Recognizes the compiler family from the executable file name.
    pub fn recognize(&self, compiler: &Path) -> Option<ToolchainFamily> {
        let name = executable_name(compiler)?;
        self.patterns
            .iter()
            .find(|(_, pattern)| pattern.is_match(&name))
            .map(|(family, _)| *family)
    }

    /// The toolchain mode of the compiler, with the architecture taken from
    /// the command line when it was given.
    pub fn mode(&self, compiler: &Path, architecture: Option<Architecture>) -> ToolchainMode {
        let Some(family) = self.recognize(compiler) else {
            log::debug!("Compiler not recognized, platform default mode: {}", compiler.display());
            return ToolchainMode::platform_default();
        };

        let architecture = match family {
            ToolchainFamily::Msvc => compiler
                .parent()
                .and_then(Path::file_name)
                .and_then(|name| name.to_str())
                .and_then(parse_architecture)
                .or(architecture),
            _ => architecture.or_else(|| cross_prefix(compiler).and_then(|prefix| parse_architecture(&prefix))),
        };
        ToolchainMode::new(family, architecture.unwrap_or(Architecture::X64))
    }
}

impl Default for ToolchainRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

/// The lower case file name without the `.exe` extension.
fn executable_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?.to_lowercase();
    Some(name.strip_suffix(".exe").map(str::to_string).unwrap_or(name))
}

/// The target triple part of a cross compiler name (`arm-none-eabi` of `arm-none-eabi-gcc`).
fn cross_prefix(compiler: &Path) -> Option<String> {
    let name = executable_name(compiler)?;
    let (prefix, _) = name.rsplit_once('-')?;
    // `gcc-9`, `clang-14`: version suffix, no prefix
    if prefix.contains('-') || !name.rsplit('-').next()?.chars().all(|c| c.is_ascii_digit() || c == '.') {
        Some(prefix.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn mode(family: ToolchainFamily, architecture: Architecture) -> ToolchainMode {
        ToolchainMode::new(family, architecture)
    }

    #[test]
    fn test_parse_architecture() {
        assert_eq!(parse_architecture("x86_64-linux-gnu"), Some(Architecture::X64));
        assert_eq!(parse_architecture("x86-64"), Some(Architecture::X64));
        assert_eq!(parse_architecture("i686-w64-mingw32"), Some(Architecture::X86));
        assert_eq!(parse_architecture("aarch64-linux-gnu"), Some(Architecture::Arm64));
        assert_eq!(parse_architecture("arm64"), Some(Architecture::Arm64));
        assert_eq!(parse_architecture("armv7-a"), Some(Architecture::Arm));
        assert_eq!(parse_architecture("thumbv7em-none-eabi"), Some(Architecture::Arm));
        assert_eq!(parse_architecture("Hostx64"), Some(Architecture::X64));
        assert_eq!(parse_architecture("x86_arm"), Some(Architecture::Arm));
        assert_eq!(parse_architecture("native"), None);
        assert_eq!(parse_architecture("AVX2"), None);
    }

    #[test]
    fn test_recognize_families() {
        let sut = ToolchainRecognizer::new();

        assert_eq!(sut.recognize(Path::new("cl.exe")), Some(ToolchainFamily::Msvc));
        assert_eq!(sut.recognize(Path::new("C:/VC/bin/CL.EXE")), Some(ToolchainFamily::Msvc));
        assert_eq!(sut.recognize(Path::new("clang-cl")), Some(ToolchainFamily::Clang));
        assert_eq!(sut.recognize(Path::new("/usr/bin/clang++-15")), Some(ToolchainFamily::Clang));
        assert_eq!(sut.recognize(Path::new("armclang")), Some(ToolchainFamily::Clang));
        assert_eq!(sut.recognize(Path::new("arm-none-eabi-gcc")), Some(ToolchainFamily::Gcc));
        assert_eq!(sut.recognize(Path::new("g++-11")), Some(ToolchainFamily::Gcc));
        assert_eq!(sut.recognize(Path::new("nvcc")), None);
    }

    #[test]
    fn test_msvc_architecture_from_layout() {
        let sut = ToolchainRecognizer::new();

        assert_eq!(
            sut.mode(Path::new("C:/VC/Tools/MSVC/14.3/bin/Hostx64/arm64/cl.exe"), None),
            mode(ToolchainFamily::Msvc, Architecture::Arm64)
        );
        assert_eq!(
            sut.mode(Path::new("C:/VC/Tools/MSVC/14.3/bin/Hostx64/x86/cl.exe"), Some(Architecture::X64)),
            mode(ToolchainFamily::Msvc, Architecture::X86)
        );
        assert_eq!(sut.mode(Path::new("cl.exe"), None), mode(ToolchainFamily::Msvc, Architecture::X64));
    }

    #[test]
    fn test_gnu_architecture() {
        let sut = ToolchainRecognizer::new();

        assert_eq!(
            sut.mode(Path::new("/opt/arm-none-eabi-gcc"), None),
            mode(ToolchainFamily::Gcc, Architecture::Arm)
        );
        assert_eq!(
            sut.mode(Path::new("aarch64-linux-gnu-g++-10"), None),
            mode(ToolchainFamily::Gcc, Architecture::Arm64)
        );
        assert_eq!(sut.mode(Path::new("gcc-9"), None), mode(ToolchainFamily::Gcc, Architecture::X64));
        assert_eq!(
            sut.mode(Path::new("clang"), Some(Architecture::Arm64)),
            mode(ToolchainFamily::Clang, Architecture::Arm64)
        );
        assert_eq!(
            sut.mode(Path::new("arm-none-eabi-gcc"), Some(Architecture::X86)),
            mode(ToolchainFamily::Gcc, Architecture::X86)
        );
    }

    #[test]
    fn test_unknown_compiler_gets_platform_default() {
        let sut = ToolchainRecognizer::new();

        assert_eq!(sut.mode(Path::new("nvcc"), Some(Architecture::Arm)), ToolchainMode::platform_default());
    }

    #[test]
    fn test_mode_string_form() {
        let sut = mode(ToolchainFamily::Gcc, Architecture::X64);

        assert_eq!(sut.to_string(), "gcc-x64");
        assert_eq!("msvc-arm64".parse(), Ok(mode(ToolchainFamily::Msvc, Architecture::Arm64)));
        assert!("gcc".parse::<ToolchainMode>().is_err());
        assert!("icc-x64".parse::<ToolchainMode>().is_err());

        let json = serde_json::to_string(&sut).unwrap();
        assert_eq!(json, "\"gcc-x64\"");
        assert_eq!(serde_json::from_str::<ToolchainMode>(&json).unwrap(), sut);
    }
}
