//! Startup checks module for xfade-concat
//!
//! Provides preflight checks to verify the external tools before any work starts:
//! - ffprobe availability
//! - FFmpeg version check (the xfade filter needs 4.3+)

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, warn};

/// Oldest FFmpeg release that ships the xfade filter.
pub const MIN_XFADE_VERSION: (u32, u32) = (4, 3);

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{0} not available")]
    ToolUnavailable(String),

    #[error("FFmpeg version requirement not met: {0}")]
    FfmpegVersion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Locations of the external tools.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

/// Runs `<program> -version` and returns its stdout.
pub fn check_tool_available(program: &Path) -> Result<String, StartupError> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .map_err(|e| {
            StartupError::ToolUnavailable(format!(
                "{} -version failed; is it installed and in PATH? Error: {}",
                program.display(),
                e
            ))
        })?;

    if !output.status.success() {
        return Err(StartupError::ToolUnavailable(format!(
            "{} -version exited with {}",
            program.display(),
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse FFmpeg version string and extract the (major, minor) version
///
/// Handles various FFmpeg version formats:
/// - Standard: "ffmpeg version 6.1.1 ..."
/// - N-prefixed: "ffmpeg version n7.0-... ..."
/// - Major only: "ffmpeg version 5 ..." (minor reads as 0)
///
/// Git snapshot builds ("N-113000-g...") carry no release number and yield `None`.
pub fn parse_ffmpeg_version(version_output: &str) -> Option<(u32, u32)> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let version_part = version_line
        .to_lowercase()
        .split("ffmpeg version")
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    let version_str = version_part.trim_start_matches('n');

    let mut numbers = version_str.split(['.', '-']);
    let major = numbers.next()?.parse().ok()?;
    let minor = numbers
        .next()
        .and_then(|m| m.parse().ok())
        .unwrap_or(0);

    Some((major, minor))
}

/// Check that FFmpeg is recent enough for the xfade filter
///
/// Snapshot builds whose version cannot be parsed are accepted with a warning.
pub fn check_ffmpeg_supports_xfade(program: &Path) -> Result<(), StartupError> {
    let version_output = check_tool_available(program)?;

    match parse_ffmpeg_version(&version_output) {
        Some(version) if version < MIN_XFADE_VERSION => Err(StartupError::FfmpegVersion(format!(
            "FFmpeg {}.{} or newer required for xfade, got: {}.{}",
            MIN_XFADE_VERSION.0, MIN_XFADE_VERSION.1, version.0, version.1
        ))),
        Some(version) => {
            debug!(major = version.0, minor = version.1, "ffmpeg version ok");
            Ok(())
        }
        None => {
            warn!(
                first_line = version_output.lines().next().unwrap_or("(empty)"),
                "could not parse FFmpeg version; assuming a development build"
            );
            Ok(())
        }
    }
}

/// Run all startup checks in order
///
/// Checks are run in the following order:
/// 1. ffprobe availability
/// 2. FFmpeg availability and version
pub fn run_startup_checks(tools: &ToolPaths) -> Result<(), StartupError> {
    check_tool_available(&tools.ffprobe)?;
    check_ffmpeg_supports_xfade(&tools.ffmpeg)?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_parse_release_versions(
            major in 0u32..100,
            minor in 0u32..100,
            patch in 0u32..100,
            n_prefix in proptest::bool::ANY,
        ) {
            let output = format!(
                "ffmpeg version {}{}.{}.{} Copyright (c) 2000-2024 the FFmpeg developers\nbuilt with gcc 13",
                if n_prefix { "n" } else { "" },
                major,
                minor,
                patch
            );
            prop_assert_eq!(parse_ffmpeg_version(&output), Some((major, minor)));
        }
    }

    #[test]
    fn test_parse_distro_suffix() {
        let output = "ffmpeg version 4.4.2-0ubuntu0.22.04.1 Copyright (c) 2000-2021";
        assert_eq!(parse_ffmpeg_version(output), Some((4, 4)));
    }

    #[test]
    fn test_parse_major_only() {
        assert_eq!(parse_ffmpeg_version("ffmpeg version 5 Copyright"), Some((5, 0)));
    }

    #[test]
    fn test_parse_snapshot_build() {
        let output = "ffmpeg version N-113000-g1234abcd Copyright (c) 2000-2024";
        assert_eq!(parse_ffmpeg_version(output), None);
    }

    #[test]
    fn test_parse_no_version_line() {
        assert_eq!(parse_ffmpeg_version("something else entirely"), None);
        assert_eq!(parse_ffmpeg_version(""), None);
    }

    #[test]
    fn test_version_ordering_against_minimum() {
        assert!((4, 2) < MIN_XFADE_VERSION);
        assert!((4, 3) >= MIN_XFADE_VERSION);
        assert!((5, 0) >= MIN_XFADE_VERSION);
    }

    #[test]
    fn test_missing_tool_is_unavailable() {
        let err = check_tool_available(Path::new("/nonexistent/xfade-test-tool")).unwrap_err();
        assert!(matches!(err, StartupError::ToolUnavailable(_)));
    }
}
