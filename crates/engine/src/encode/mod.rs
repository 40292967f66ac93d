//! Encoding modules for xfade-concat

pub mod ffmpeg;

pub use ffmpeg::{
    build_ffmpeg_command, copy_single_clip, ffmpeg_args, render_command_line, run_ffmpeg,
    write_filter_script, ExecuteError, ExecuteOptions, FILTER_SCRIPT_THRESHOLD,
};
