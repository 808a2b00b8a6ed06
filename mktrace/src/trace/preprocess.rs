// SPDX-License-Identifier: GPL-3.0-or-later

//! Normalization of the raw dry-run output before the structural parsing.
//!
//! The later passes expect one command per line, with the tool as the first
//! word. This pass makes that true for the common shell constructs:
//!
//! - lines continued with a trailing backslash are joined,
//! - compound commands (`&&`, `;`) are split into separate lines,
//! - compiler launchers (`ccache`, `distcc`, libtool's mode prefix) are removed,
//! - an MSVC style compile line which also links (`cl ... /link ...`) is split
//!   into the compile line and a separate `link` line.

use super::scan::{CancellationToken, Cancelled, LineScanner, Scan};
use super::switches::{SwitchStyle, tokenize};
use regex::Regex;
use std::sync::LazyLock;

static SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(?:&&|;)\s*").expect("Invalid regex pattern"));

static LAUNCHER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:libtool:\s+(?:compile|link):\s+)?(?:(?:ccache|sccache|distcc|icecc)\s+)*")
        .expect("Invalid regex pattern")
});

static LINK_MODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<compile>.*?)\s+[/-]link(?:\s+(?P<rest>.*))?$").expect("Invalid regex pattern")
});

/// Line scanner which emits the normalized lines.
#[derive(Debug, Default)]
pub struct Preprocessor {
    pending: Option<String>,
}

impl Preprocessor {
    fn emit(&self, line: &str, found: &mut Vec<String>) {
        for piece in SEPARATOR.split(line) {
            let piece = LAUNCHER.replace(piece, "");
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            match split_link_mode(piece) {
                Some((compile, link)) => {
                    log::debug!("Compile line split into a separate link line: {link}");
                    found.push(compile);
                    found.push(link);
                }
                None => found.push(piece.to_string()),
            }
        }
    }
}

impl LineScanner for Preprocessor {
    type Item = String;

    fn scan_line(&mut self, line: &str, found: &mut Vec<String>) {
        let line = line.trim_end_matches('\r');
        let joined = match self.pending.take() {
            Some(mut pending) => {
                pending.push(' ');
                pending.push_str(line.trim_start());
                pending
            }
            None => line.to_string(),
        };

        let trimmed = joined.trim_end();
        match trimmed.strip_suffix('\\') {
            Some(head) => self.pending = Some(head.trim_end().to_string()),
            None => self.emit(trimmed, found),
        }
    }

    fn finish(&mut self, found: &mut Vec<String>) {
        if let Some(pending) = self.pending.take() {
            self.emit(&pending, found);
        }
    }
}

/// Splits `cl <compile arguments> /link <link arguments>` into two lines.
fn split_link_mode(line: &str) -> Option<(String, String)> {
    let command = tokenize(line).into_iter().next()?;
    if SwitchStyle::of_tool(&super::remove_quotes(&command)) != SwitchStyle::Msvc {
        return None;
    }
    let captures = LINK_MODE.captures(line)?;
    let compile = captures.name("compile")?.as_str().trim().to_string();
    let rest = captures.name("rest").map(|m| m.as_str().trim()).unwrap_or_default();
    let link = if rest.is_empty() { "link".to_string() } else { format!("link {rest}") };
    Some((compile, link))
}

/// Creates the scan over the raw trace which yields the normalized lines.
pub fn scan<'a>(raw: &'a str, cancel: &CancellationToken, chunk_size: usize) -> Scan<'a, Preprocessor> {
    Scan::new(raw, Preprocessor::default(), cancel, chunk_size)
}

/// Normalizes the whole trace, or reports the cancellation.
pub fn preprocess(raw: &str, cancel: &CancellationToken, chunk_size: usize) -> Result<String, Cancelled> {
    let lines = scan(raw, cancel, chunk_size).complete()?;
    let mut result = lines.join("\n");
    if !result.is_empty() {
        result.push('\n');
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;

    fn run(raw: &str) -> String {
        preprocess(raw, &CancellationToken::new(), 2).unwrap()
    }

    #[test]
    fn test_separators_are_split() {
        assert_eq!(run("cd src && gcc -c a.c ; gcc -c b.c\n"), "cd src\ngcc -c a.c\ngcc -c b.c\n");
    }

    #[test]
    fn test_continuations_are_joined() {
        let raw = "gcc -c \\\n    -Iinc \\\n    a.c\necho done\n";

        assert_eq!(run(raw), "gcc -c -Iinc a.c\necho done\n");
    }

    #[test]
    fn test_dangling_continuation_is_flushed() {
        assert_eq!(run("gcc -c a.c \\"), "gcc -c a.c\n");
    }

    #[test]
    fn test_line_endings_are_normalized() {
        assert_eq!(run("gcc -c a.c\r\ngcc -c b.c\r\n"), "gcc -c a.c\ngcc -c b.c\n");
    }

    #[test]
    fn test_launchers_are_removed() {
        assert_eq!(run("ccache gcc -c a.c\n"), "gcc -c a.c\n");
        assert_eq!(run("libtool: compile:  distcc ccache gcc -c a.c\n"), "gcc -c a.c\n");
        assert_eq!(run("libtool: link: gcc -o app a.o\n"), "gcc -o app a.o\n");
    }

    #[test]
    fn test_msvc_link_mode_is_split() {
        let raw = "cl.exe /nologo main.cpp /link /out:app.exe user32.lib\n";

        assert_eq!(run(raw), "cl.exe /nologo main.cpp\nlink /out:app.exe user32.lib\n");
    }

    #[test]
    fn test_gnu_lines_are_not_split_on_link() {
        let raw = "gcc -o app main.c -link\n";

        assert_eq!(run(raw), "gcc -o app main.c -link\n");
    }

    #[test]
    fn test_empty_pieces_are_dropped() {
        assert_eq!(run("\n  \n; ;\n"), "");
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(preprocess("gcc -c a.c", &cancel, 10), Err(Cancelled));
    }
}
