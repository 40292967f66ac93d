//! FFmpeg executor module for xfade-concat
//!
//! Turns a compiled [`GraphPlan`] into an ffmpeg invocation and runs it,
//! plus the copy path used when only one clip is left.

use crate::plan::GraphPlan;
use std::ffi::OsString;
use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Filter expressions longer than this are written to a script file instead
/// of being passed on the command line.
pub const FILTER_SCRIPT_THRESHOLD: usize = 4096;

/// Error type for execution operations
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// ffmpeg exited with non-zero status
    #[error("ffmpeg failed with exit code: {0}")]
    Failed(i32),

    /// ffmpeg was terminated by a signal
    #[error("ffmpeg process was terminated by signal")]
    Terminated,

    /// The run was interrupted and ffmpeg was killed
    #[error("ffmpeg was cancelled")]
    Cancelled,

    /// ffmpeg could not be started
    #[error("Failed to start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error during execution
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How ffmpeg is invoked.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// ffmpeg executable name or path
    pub program: PathBuf,
    /// Value for `-loglevel`
    pub loglevel: String,
    /// Pass `-y` so an existing output is overwritten
    pub overwrite: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            loglevel: "error".to_string(),
            overwrite: true,
        }
    }
}

/// Builds the ffmpeg argument vector for a plan.
///
/// Layout:
/// - `-hide_banner -loglevel <level>` and `-y` when overwriting
/// - one `-i <clip>` per input, in plan order
/// - `-filter_complex <expr>`, or `-filter_complex_script <file>` when given
/// - `-map <output label>` and the destination path
pub fn ffmpeg_args(
    plan: &GraphPlan,
    output: &Path,
    options: &ExecuteOptions,
    filter_script: Option<&Path>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-loglevel".into()];
    args.push(options.loglevel.clone().into());

    if options.overwrite {
        args.push("-y".into());
    }

    for input in plan.inputs() {
        args.push("-i".into());
        args.push(input.clone().into());
    }

    match filter_script {
        Some(script) => {
            args.push("-filter_complex_script".into());
            args.push(script.into());
        }
        None => {
            args.push("-filter_complex".into());
            args.push(plan.filter_expression().into());
        }
    }

    args.push("-map".into());
    args.push(plan.output_label().to_string().into());
    args.push(output.into());

    args
}

/// Build an ffmpeg command for a plan
///
/// # Arguments
/// * `plan` - Compiled transition graph
/// * `output` - Destination media path
/// * `options` - Program, log level and overwrite behaviour
/// * `filter_script` - Script file holding the filter expression, if one was written
pub fn build_ffmpeg_command(
    plan: &GraphPlan,
    output: &Path,
    options: &ExecuteOptions,
    filter_script: Option<&Path>,
) -> Command {
    let mut cmd = Command::new(&options.program);
    cmd.args(ffmpeg_args(plan, output, options, filter_script));
    cmd
}

/// Writes the plan's filter expression to a scratch file when it is too long
/// for the command line.
///
/// The file is deleted when the returned handle is dropped; removal errors are
/// ignored.
pub fn write_filter_script(plan: &GraphPlan) -> Result<Option<NamedTempFile>, ExecuteError> {
    let expression = plan.filter_expression();
    if expression.len() <= FILTER_SCRIPT_THRESHOLD {
        return Ok(None);
    }

    let mut script = tempfile::Builder::new()
        .prefix("xfade-filter-")
        .suffix(".txt")
        .tempfile()?;
    script.write_all(expression.as_bytes())?;
    script.flush()?;

    debug!(
        script = %script.path().display(),
        bytes = expression.len(),
        "wrote filter script"
    );
    Ok(Some(script))
}

/// One-line rendering of a command, for dry runs and logs.
pub fn render_command_line(program: &Path, args: &[OsString]) -> String {
    let mut parts = vec![quote(&program.to_string_lossy())];
    parts.extend(args.iter().map(|a| quote(&a.to_string_lossy())));
    parts.join(" ")
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Execute ffmpeg for a plan
///
/// Spawns ffmpeg and waits for it to exit. If `cancel` resolves first the
/// child is killed and [`ExecuteError::Cancelled`] is returned. There is no
/// retry: a non-zero exit code is returned as-is in [`ExecuteError::Failed`].
pub async fn run_ffmpeg<F>(
    plan: &GraphPlan,
    output: &Path,
    options: &ExecuteOptions,
    cancel: F,
) -> Result<(), ExecuteError>
where
    F: Future<Output = ()>,
{
    // Must outlive the child process
    let script = write_filter_script(plan)?;
    let script_path = script.as_ref().map(|s| s.path());

    let std_cmd = build_ffmpeg_command(plan, output, options, script_path);
    info!(
        program = %options.program.display(),
        inputs = plan.inputs().len(),
        output = %output.display(),
        "starting ffmpeg"
    );
    debug!(
        command = %render_command_line(
            &options.program,
            &ffmpeg_args(plan, output, options, script_path)
        ),
        "ffmpeg command line"
    );

    let mut cmd = tokio::process::Command::from(std_cmd);
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| ExecuteError::Spawn {
        program: options.program.clone(),
        source,
    })?;

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = cancel => {
            warn!("interrupt received; stopping ffmpeg");
            child.kill().await?;
            return Err(ExecuteError::Cancelled);
        }
    };

    if status.success() {
        info!(output = %output.display(), "ffmpeg finished");
        Ok(())
    } else {
        match status.code() {
            Some(code) => Err(ExecuteError::Failed(code)),
            None => Err(ExecuteError::Terminated),
        }
    }
}

/// Copies a lone clip straight to the destination.
///
/// Parent directories of `output` are created as needed. Copying a file onto
/// itself is a no-op. Returns the number of bytes written.
pub fn copy_single_clip(input: &Path, output: &Path) -> Result<u64, ExecuteError> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    if let (Ok(src), Ok(dst)) = (input.canonicalize(), output.canonicalize()) {
        if src == dst {
            debug!(path = %src.display(), "input and output are the same file; nothing to copy");
            return Ok(fs::metadata(&src)?.len());
        }
    }

    let bytes = fs::copy(input, output)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        bytes,
        "single clip copied to output"
    );
    Ok(bytes)
}
