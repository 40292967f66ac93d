//! Run pipeline for xfade-concat
//!
//! Merges settings from flags, environment and config file, then drives one
//! run: inventory, duration probes, graph compilation and ffmpeg.

use crate::compiler::{compile_with_probe, CompileError};
use crate::config::{
    parse_duration, parse_effects, ConfigError, ConfigFile, DEFAULT_DURATION_SECS,
    DEFAULT_EFFECTS, DEFAULT_FPS, DEFAULT_LOGLEVEL,
};
use crate::encode::{
    copy_single_clip, ffmpeg_args, render_command_line, run_ffmpeg, ExecuteError, ExecuteOptions,
};
use crate::inventory::{resolve_clips, InventoryError, InventoryRequest};
use crate::plan::{Clip, TransitionSpec};
use crate::probe::DurationProbe;
use crate::startup::{run_startup_checks, StartupError, ToolPaths};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Error type for a run
#[derive(Debug, Error)]
pub enum RunError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Missing or contradictory arguments
    #[error("Invalid arguments: {0}")]
    Argument(String),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Clip resolution failed
    #[error("Could not resolve clips: {0}")]
    Inventory(#[from] InventoryError),

    /// Graph compilation failed
    #[error("Could not build transition graph: {0}")]
    Compile(#[from] CompileError),

    /// ffmpeg or the single-clip copy failed
    #[error("{0}")]
    Execute(#[from] ExecuteError),
}

impl RunError {
    /// Process exit code for this error.
    ///
    /// ffmpeg's own non-zero exit code is passed through; everything else is 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Execute(ExecuteError::Failed(code)) => u8::try_from(*code)
                .ok()
                .filter(|c| *c != 0)
                .unwrap_or(1),
            _ => 1,
        }
    }
}

/// Values given on the command line. `None`/empty means "not given".
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub inputs: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub grep: Option<String>,
    pub sort: bool,
    pub effects: Option<String>,
    pub duration: Option<String>,
    pub loglevel: Option<String>,
    pub fps: Option<u32>,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    pub skip_checks: bool,
    pub dry_run: bool,
}

/// Fully merged settings for one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub inventory: InventoryRequest,
    pub output: PathBuf,
    pub transition: TransitionSpec,
    pub execute: ExecuteOptions,
    pub tools: ToolPaths,
    pub skip_checks: bool,
    pub dry_run: bool,
}

impl RunSettings {
    /// Merge command-line values over a loaded config.
    ///
    /// Precedence: command line, then config (which already carries any
    /// environment overrides), then built-in defaults.
    pub fn merge(cli: SettingsOverrides, config: &ConfigFile) -> Result<Self, RunError> {
        let inputs = if cli.inputs.is_empty() {
            config
                .input
                .as_ref()
                .map(|i| i.paths())
                .unwrap_or_default()
        } else {
            cli.inputs
        };
        if inputs.is_empty() {
            return Err(RunError::Argument("no input clips or directory given".to_string()));
        }

        let output = cli
            .output
            .or_else(|| config.output.as_ref().map(PathBuf::from))
            .ok_or_else(|| RunError::Argument("no output path given".to_string()))?;

        let effects = match cli.effects.as_deref().or(config.effects.as_deref()) {
            Some(raw) => parse_effects(raw)?,
            None => parse_effects(DEFAULT_EFFECTS)?,
        };

        let transition_duration = match (&cli.duration, &config.duration) {
            (Some(raw), _) => parse_duration(raw)?,
            (None, Some(value)) => value.seconds()?,
            (None, None) => DEFAULT_DURATION_SECS,
        };

        let fps = cli.fps.or(config.fps).unwrap_or(DEFAULT_FPS);
        if fps == 0 {
            return Err(ConfigError::InvalidFrameRate(fps).into());
        }

        let loglevel = cli
            .loglevel
            .or_else(|| config.loglevel.clone())
            .unwrap_or_else(|| DEFAULT_LOGLEVEL.to_string());

        let defaults = ToolPaths::default();
        let tools = ToolPaths {
            ffmpeg: cli.ffmpeg.unwrap_or(defaults.ffmpeg),
            ffprobe: cli.ffprobe.unwrap_or(defaults.ffprobe),
        };

        Ok(Self {
            inventory: InventoryRequest {
                inputs,
                grep: cli.grep.or_else(|| config.grep.clone()),
                sort: cli.sort || config.sort.unwrap_or(false),
            },
            output,
            transition: TransitionSpec::new(transition_duration, effects).with_frame_rate(fps),
            execute: ExecuteOptions {
                program: tools.ffmpeg.clone(),
                loglevel,
                overwrite: true,
            },
            tools,
            skip_checks: cli.skip_checks,
            dry_run: cli.dry_run,
        })
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Only one clip was found; it was copied to the output.
    Copied { clip: PathBuf, bytes: u64 },
    /// ffmpeg rendered the crossfaded output.
    Rendered { clips: usize, junctions: usize },
    /// Nothing was written; this is what would have run.
    DryRun { command: String },
}

/// Run one join from start to finish
///
/// 1. Resolve the clip list
/// 2. No clips is an error; one clip is copied to the output as-is
/// 3. Check the external tools (unless skipped)
/// 4. Probe durations and compile the transition graph
/// 5. Run ffmpeg, or describe the command for a dry run
///
/// `cancel` resolving while ffmpeg runs kills it.
pub async fn run<P, F>(
    settings: &RunSettings,
    probe: Arc<P>,
    cancel: F,
) -> Result<RunOutcome, RunError>
where
    P: DurationProbe + 'static,
    F: Future<Output = ()>,
{
    let paths = resolve_clips(&settings.inventory)?;
    info!(count = paths.len(), "resolved clips");

    match paths.as_slice() {
        [] => return Err(CompileError::InsufficientInputs { found: 0 }.into()),
        [only] => return copy_only_clip(only, &settings.output, settings.dry_run),
        _ => {}
    }

    if !settings.skip_checks {
        run_startup_checks(&settings.tools)?;
    }

    let clips = Clip::sequence(paths);
    let plan = compile_with_probe(&clips, &settings.transition, probe).await?;
    info!(
        junctions = plan.junctions().len(),
        transition = settings.transition.transition_duration,
        "compiled transition graph"
    );

    if settings.dry_run {
        let args = ffmpeg_args(&plan, &settings.output, &settings.execute, None);
        return Ok(RunOutcome::DryRun {
            command: render_command_line(&settings.execute.program, &args),
        });
    }

    run_ffmpeg(&plan, &settings.output, &settings.execute, cancel).await?;

    Ok(RunOutcome::Rendered {
        clips: plan.inputs().len(),
        junctions: plan.junctions().len(),
    })
}

fn copy_only_clip(clip: &Path, output: &Path, dry_run: bool) -> Result<RunOutcome, RunError> {
    info!(clip = %clip.display(), "only one clip found; copying instead of rendering");

    if dry_run {
        return Ok(RunOutcome::DryRun {
            command: render_command_line(
                Path::new("cp"),
                &[clip.as_os_str().to_owned(), output.as_os_str().to_owned()],
            ),
        });
    }

    let bytes = copy_single_clip(clip, output)?;
    Ok(RunOutcome::Copied {
        clip: clip.to_path_buf(),
        bytes,
    })
}
