// SPDX-License-Identifier: GPL-3.0-or-later

//! Recognition of tool invocations in the trace lines.
//!
//! A line is an invocation of a tool when the command (the first word of the
//! line) names one of the tools the matcher was built for. The command may
//! carry a path (`/usr/bin/gcc`, `"C:/Program Files/LLVM/bin/clang-cl.exe"`),
//! and compilers often carry decorations (`arm-none-eabi-gcc-9`).
//!
//! The path written in the trace is resolved against the current directory.
//! When the line names a path which does not exist, the match is rejected:
//! this filters out lines where the tool name is only part of a longer word.

use super::make_full_path;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One recognized invocation of a named tool on a trace line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// The directory part of the command as it was written (quotes removed).
    pub path_in_trace: String,
    /// The tool name as it was written, with decorations, without extension.
    pub tool_name: String,
    pub full_path: PathBuf,
    pub found: bool,
    pub arguments: String,
}

impl ToolInvocation {
    /// The file name of the resolved tool (with the executable extension).
    pub fn file_name(&self) -> String {
        self.full_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.tool_name.clone())
    }
}

/// Builds and holds the recognizer pattern for a set of tool names.
#[derive(Debug, Clone)]
pub struct ToolMatcher {
    pattern: Option<Regex>,
    extension: String,
    known_paths: HashSet<PathBuf>,
}

impl ToolMatcher {
    /// Creates a matcher for the exact tool names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build(names, false, std::env::consts::EXE_EXTENSION)
    }

    /// Creates a matcher which also accepts `prefix-` and `-suffix`
    /// decorations around the tool names (cross compilers, versioned tools).
    pub fn decorated<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build(names, true, std::env::consts::EXE_EXTENSION)
    }

    /// Rebuilds the pattern with another executable extension.
    ///
    /// The extension is given without the leading dot. Empty means none.
    pub fn with_extension<I, S>(names: I, decorated: bool, extension: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build(names, decorated, extension)
    }

    /// Paths which are accepted even when they do not exist (yet) on disk.
    pub fn with_known_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.known_paths.extend(paths);
        self
    }

    fn build<I, S>(names: I, decorated: bool, extension: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_string())
            .filter(|name| !name.is_empty())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        // Longer names first, so `clang-cl` is not taken as a decorated `clang`.
        unique.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let pattern = if unique.is_empty() {
            None
        } else {
            let alternatives = unique.iter().map(|name| regex::escape(name)).collect::<Vec<_>>().join("|");
            let tool = if decorated {
                format!(r"(?:[a-zA-Z0-9_.]*-)*(?:{alternatives})(?:-[\d.]+)?")
            } else {
                format!(r"(?:{alternatives})")
            };
            let ext = if extension.is_empty() {
                String::new()
            } else {
                format!(r"(?:\.{})", regex::escape(extension))
            };
            let source = format!(
                r#"^\s*(?:"(?P<qprefix>[^"]*[/\\])?(?P<qtool>{tool})(?P<qext>{ext})?"|(?P<prefix>(?:"[^"]*"|[^\s"])*[/\\])?(?P<tool>{tool})(?P<ext>{ext})?)[\s"]+(?P<args>.*)$"#
            );
            match Regex::new(&source) {
                Ok(regex) => Some(regex),
                Err(error) => {
                    log::warn!("Could not build tool pattern: {error}");
                    None
                }
            }
        };

        Self { pattern, extension: extension.to_string(), known_paths: HashSet::new() }
    }

    /// Returns the invocation when the line invokes one of the tools.
    pub fn matches(&self, line: &str, current_dir: &Path) -> Option<ToolInvocation> {
        let captures = self.pattern.as_ref()?.captures(line)?;

        let (prefix, tool, has_extension) = match captures.name("qtool") {
            Some(tool) => (
                captures.name("qprefix").map(|m| m.as_str()).unwrap_or_default(),
                tool.as_str(),
                captures.name("qext").is_some(),
            ),
            None => (
                captures.name("prefix").map(|m| m.as_str()).unwrap_or_default(),
                captures.name("tool")?.as_str(),
                captures.name("ext").is_some(),
            ),
        };

        let mut file_name = tool.to_string();
        let dotted = format!(".{}", self.extension);
        if !self.extension.is_empty() && (has_extension || !tool.ends_with(&dotted)) {
            file_name.push_str(&dotted);
        }

        let full_path = make_full_path(&format!("{prefix}{file_name}"), current_dir);
        let found = full_path.is_file();
        if !prefix.is_empty() && !found && !self.known_paths.contains(&full_path) {
            log::debug!("Tool path does not exist, line not taken: {}", full_path.display());
            return None;
        }

        let tool_name = match tool.strip_suffix(dotted.as_str()) {
            Some(stem) if !self.extension.is_empty() => stem.to_string(),
            _ => tool.to_string(),
        };

        Some(ToolInvocation {
            path_in_trace: super::remove_quotes(prefix),
            tool_name,
            full_path,
            found,
            arguments: captures.name("args").map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_bare_name_is_tolerated() {
        let sut = ToolMatcher::with_extension(["gcc", "cc"], false, "");

        let result = sut.matches("gcc -c main.c -o main.o", Path::new("/w")).unwrap();
        assert_eq!(result.path_in_trace, "");
        assert_eq!(result.tool_name, "gcc");
        assert_eq!(result.full_path, PathBuf::from("/w/gcc"));
        assert!(!result.found);
        assert_eq!(result.arguments, "-c main.c -o main.o");
    }

    #[test]
    fn test_missing_prefixed_path_is_rejected() {
        let sut = ToolMatcher::with_extension(["gcc"], false, "");

        assert_eq!(sut.matches("/nonexistent/bin/gcc -c main.c", Path::new("/w")), None);
    }

    #[test]
    fn test_existing_prefixed_path() -> anyhow::Result<()> {
        let root = TempDir::new()?;
        let bin = root.path().join("tools bin");
        fs::create_dir_all(&bin)?;
        fs::write(bin.join("gcc"), "")?;
        let sut = ToolMatcher::with_extension(["gcc"], false, "");

        let line = format!("\"{}/gcc\" -c main.c", bin.display());
        let result = sut.matches(&line, Path::new("/w")).unwrap();
        assert!(result.found);
        assert_eq!(result.full_path, bin.join("gcc"));
        assert_eq!(result.arguments, "-c main.c");

        let relative = sut.matches("\"tools bin\"/gcc -c main.c", root.path()).unwrap();
        assert!(relative.found);
        assert_eq!(relative.path_in_trace, "tools bin/");
        Ok(())
    }

    #[test]
    fn test_known_path_is_accepted() {
        let sut = ToolMatcher::with_extension(["app"], false, "")
            .with_known_paths([PathBuf::from("/w/out/app")]);

        let result = sut.matches("./out/app --flag", Path::new("/w")).unwrap();
        assert!(!result.found);
        assert_eq!(result.full_path, PathBuf::from("/w/out/app"));
        assert_eq!(sut.matches("./other/app --flag", Path::new("/w")), None);
    }

    #[test]
    fn test_executable_extension() {
        let sut = ToolMatcher::with_extension(["cl", "link"], false, "exe");

        let with = sut.matches("cl.exe /c main.cpp", Path::new("/w")).unwrap();
        assert_eq!(with.tool_name, "cl");
        assert_eq!(with.full_path, PathBuf::from("/w/cl.exe"));
        assert_eq!(with.arguments, "/c main.cpp");

        let without = sut.matches("link a.obj", Path::new("/w")).unwrap();
        assert_eq!(without.full_path, PathBuf::from("/w/link.exe"));
    }

    #[test]
    fn test_decorated_names() {
        let sut = ToolMatcher::with_extension(["gcc", "clang", "clang-cl"], true, "");

        let cross = sut.matches("arm-none-eabi-gcc-9 -c a.c", Path::new("/w")).unwrap();
        assert_eq!(cross.tool_name, "arm-none-eabi-gcc-9");

        let versioned = sut.matches("clang-14 -c a.c", Path::new("/w")).unwrap();
        assert_eq!(versioned.tool_name, "clang-14");

        let msvc_like = sut.matches("clang-cl /c a.c", Path::new("/w")).unwrap();
        assert_eq!(msvc_like.tool_name, "clang-cl");
    }

    #[test]
    fn test_decoration_after_the_name_is_a_version_only() {
        let sut = ToolMatcher::with_extension(["gcc", "clang", "clang-cl", "ld"], true, "");

        assert_eq!(sut.matches("clang-format -i src/a.c", Path::new("/w")), None);
        assert_eq!(sut.matches("clang-tidy src/a.c -- -Iinc", Path::new("/w")), None);
        assert_eq!(sut.matches("gcc-ar rcs libx.a x.o", Path::new("/w")), None);
        assert_eq!(sut.matches("x86_64-linux-gnu-gcc-nm x.o", Path::new("/w")), None);
        assert_eq!(sut.matches("gcc-ranlib libx.a", Path::new("/w")), None);

        let dotted = sut.matches("gcc-12.2 -c a.c", Path::new("/w")).unwrap();
        assert_eq!(dotted.tool_name, "gcc-12.2");
    }

    #[test]
    fn test_exact_names_reject_decorations() {
        let sut = ToolMatcher::with_extension(["gcc"], false, "");

        assert_eq!(sut.matches("arm-none-eabi-gcc -c a.c", Path::new("/w")), None);
        assert_eq!(sut.matches("gcc-9 -c a.c", Path::new("/w")), None);
    }

    #[test]
    fn test_name_inside_switch_value_is_not_a_match() {
        let sut = ToolMatcher::with_extension(["gcc", "ld"], true, "");

        assert_eq!(sut.matches("ar rcs /w/gcc-libs/libgcc.a a.o", Path::new("/w")), None);
        assert_eq!(sut.matches("echo building with gcc now", Path::new("/w")), None);
        // the first word decides, not a later path
        let result = sut.matches("gcc -o /w/out/gcc-out main.c", Path::new("/w")).unwrap();
        assert_eq!(result.tool_name, "gcc");
        assert_eq!(result.arguments, "-o /w/out/gcc-out main.c");
    }

    #[test]
    fn test_empty_name_set_never_matches() {
        let sut = ToolMatcher::with_extension(Vec::<String>::new(), true, "");

        assert_eq!(sut.matches("gcc -c a.c", Path::new("/w")), None);
    }

    #[test]
    fn test_arguments_are_mandatory() {
        let sut = ToolMatcher::with_extension(["gcc"], false, "");

        assert_eq!(sut.matches("gcc", Path::new("/w")), None);
    }

    proptest! {
        #[test]
        fn tool_name_inside_value_is_rejected(
            command in "(ar|echo|cp|install|rm)",
            head in "[a-z]{1,6}",
            tail in "[a-z]{0,6}",
        ) {
            let sut = ToolMatcher::with_extension(["gcc", "link"], true, "");
            let line = format!("{command} -o /nonexistent/{head}gcc{tail}/link.out x.o");

            prop_assert_eq!(sut.matches(&line, Path::new("/w")), None);
        }
    }
}
