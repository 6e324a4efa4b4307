//! Compile-time build metadata exposed to CLI surfaces.

/// Semver package version from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// VCS commit hash captured at build time.
pub const GIT_COMMIT: &str = env!("ELEVEN_BUILD_GIT_HASH");

/// Build timestamp captured at compile time.
pub const BUILD_TIMESTAMP: &str = env!("ELEVEN_BUILD_TIMESTAMP");

/// Target triple the binary was compiled for.
pub const TARGET: &str = env!("ELEVEN_BUILD_TARGET");

/// Help trailer that surfaces build metadata in `eleven --help`.
pub const HELP_BUILD_METADATA: &str = concat!(
    "Build metadata:\n  commit: ",
    env!("ELEVEN_BUILD_GIT_HASH"),
    "\n  built: ",
    env!("ELEVEN_BUILD_TIMESTAMP"),
    "\n  target: ",
    env!("ELEVEN_BUILD_TARGET")
);

/// One-line banner shown when the REPL starts.
pub fn startup_metadata_line() -> String {
    format!("eleven v{VERSION} ({GIT_COMMIT}, built {BUILD_TIMESTAMP})")
}

/// Version block printed by `eleven --version`.
pub const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("ELEVEN_BUILD_GIT_HASH"),
    "\nbuilt: ",
    env!("ELEVEN_BUILD_TIMESTAMP"),
    "\ntarget: ",
    env!("ELEVEN_BUILD_TARGET")
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_metadata_line_contains_all_fields() {
        let text = startup_metadata_line();
        assert!(text.starts_with("eleven v"));
        assert!(text.contains(GIT_COMMIT));
        assert!(text.contains(BUILD_TIMESTAMP));
    }

    #[test]
    fn long_version_includes_expected_lines() {
        let text = LONG_VERSION;
        assert!(text.starts_with(VERSION));
        assert!(text.contains("commit:"));
        assert!(text.contains("built:"));
        assert!(text.ends_with(TARGET));
    }

    #[test]
    fn help_trailer_lists_target() {
        assert!(HELP_BUILD_METADATA.contains("target: "));
    }
}
