// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::HashSet;

// man page for `exec` (Linux system call)
pub const KEY_OS__PATH: &str = "PATH";

// set by the Visual Studio developer command prompt
pub const KEY_MSVC__SDK_VERSION: &str = "WindowsSDKVersion";

// https://www.gnu.org/software/make/manual/html_node/Options_002fRecursion.html
pub const KEY_MAKE__PROGRAM: &str = "MAKE";
pub const KEY_MAKE__FLAGS: &str = "MAKEFLAGS";

// https://www.gnu.org/software/make/manual/html_node/Implicit-Variables.html
pub const KEY_MAKE__C_COMPILER: &str = "CC";
pub const KEY_MAKE__CXX_COMPILER: &str = "CXX";
pub const KEY_MAKE__C_PREPROCESSOR: &str = "CPP";
pub const KEY_MAKE__LINKER: &str = "LD";

pub const KEY_MAKE__C_FLAGS: &str = "CFLAGS";
pub const KEY_MAKE__CXX_FLAGS: &str = "CXXFLAGS";
pub const KEY_MAKE__C_PREPROCESSOR_FLAGS: &str = "CPPFLAGS";
pub const KEY_MAKE__LINKER_FLAGS: &str = "LDFLAGS";
pub const KEY_MAKE__LINKER_LIBS: &str = "LDLIBS";

static MAKE_KEYS: std::sync::LazyLock<HashSet<&'static str>> = std::sync::LazyLock::new(|| {
    [
        KEY_MAKE__PROGRAM,
        KEY_MAKE__FLAGS,
        KEY_MAKE__C_COMPILER,
        KEY_MAKE__CXX_COMPILER,
        KEY_MAKE__C_PREPROCESSOR,
        KEY_MAKE__LINKER,
        KEY_MAKE__C_FLAGS,
        KEY_MAKE__CXX_FLAGS,
        KEY_MAKE__C_PREPROCESSOR_FLAGS,
        KEY_MAKE__LINKER_FLAGS,
        KEY_MAKE__LINKER_LIBS,
    ]
    .iter()
    .cloned()
    .collect()
});

/// The variables which change what the dry-run prints.
pub fn relevant_env(key: &str) -> bool {
    MAKE_KEYS.contains(key)
        || key == KEY_MSVC__SDK_VERSION
        // Windows PATH variable is case sensitive and not always capitalized
        || key.to_uppercase() == KEY_OS__PATH
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_relevant_env() {
        assert!(relevant_env("MAKEFLAGS"));
        assert!(relevant_env("CC"));
        assert!(relevant_env("Path"));
        assert!(relevant_env("WindowsSDKVersion"));
        assert!(!relevant_env("HOME"));
    }
}
