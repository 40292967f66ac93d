//! xfade-concat
//!
//! Joins an ordered list of video clips into one output, crossfading at
//! every junction through ffmpeg's `xfade` filter.

pub mod compiler;
pub mod encode;
pub mod inventory;
pub mod pipeline;
pub mod plan;
pub mod probe;
pub mod startup;

pub use xfade_concat_config as config;
pub use xfade_concat_config::ConfigFile;
pub use compiler::{compile, compile_with_probe, validate, CompileError};
pub use encode::{
    build_ffmpeg_command, copy_single_clip, ffmpeg_args, run_ffmpeg, ExecuteError,
    ExecuteOptions,
};
pub use inventory::{resolve_clips, InventoryError, InventoryRequest};
pub use pipeline::{run, RunError, RunOutcome, RunSettings, SettingsOverrides};
pub use plan::{Clip, GraphPlan, JunctionPlan, StreamLabel, TransitionSpec};
pub use probe::{
    parse_duration_text, parse_ffprobe_output, probe_concurrency, resolve_durations,
    resolve_durations_with_limit, DurationProbe, FfprobeDuration, ProbeError,
};
pub use startup::{
    check_ffmpeg_supports_xfade, check_tool_available, parse_ffmpeg_version, run_startup_checks,
    StartupError, ToolPaths,
};
