//! CLI entry point for xfade-concat
//!
//! Parses command line arguments, merges them with the optional JSON config,
//! and runs one join.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use xfade_concat::{run, ConfigFile, FfprobeDuration, RunOutcome, RunSettings, SettingsOverrides};

/// Join video clips into one file with a crossfade at every junction
#[derive(Parser, Debug)]
#[command(name = "xfade-concat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input clips and/or directories of clips, in output order
    #[arg(value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    /// Destination media file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON config file (input, output, grep, sort, effects, duration, loglevel, fps)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only keep clips whose file name matches this regex
    #[arg(short, long)]
    grep: Option<String>,

    /// Natural-sort clips by file name
    #[arg(short, long, default_value = "false")]
    sort: bool,

    /// Comma-separated xfade transition names, reused in turn (e.g. "fade,wipeleft")
    #[arg(short, long)]
    effects: Option<String>,

    /// Transition duration in seconds
    #[arg(short, long)]
    duration: Option<String>,

    /// ffmpeg log level
    #[arg(short, long)]
    loglevel: Option<String>,

    /// Frame rate used to normalize inputs when joining exactly two clips
    #[arg(long)]
    fps: Option<u32>,

    /// ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// ffprobe executable
    #[arg(long)]
    ffprobe: Option<PathBuf>,

    /// Skip the ffmpeg/ffprobe startup checks
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Print the ffmpeg command instead of running it
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Debug logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            inputs: self.inputs.clone(),
            output: self.output.clone(),
            grep: self.grep.clone(),
            sort: self.sort,
            effects: self.effects.clone(),
            duration: self.duration.clone(),
            loglevel: self.loglevel.clone(),
            fps: self.fps,
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
            skip_checks: self.skip_checks,
            dry_run: self.dry_run,
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves once the user interrupts; never resolves if no handler can be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            // Usage errors exit 1; --help and --version exit 0
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(args.verbose);

    let config = match &args.config {
        Some(path) => match ConfigFile::load(path) {
            Ok(config) => config,
            Err(e) => {
                error!(config = %path.display(), "{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => ConfigFile::from_env(),
    };

    let settings = match RunSettings::merge(args.overrides(), &config) {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            eprintln!("Run with --help for usage.");
            return ExitCode::from(e.exit_code());
        }
    };

    let probe = Arc::new(FfprobeDuration::new(settings.tools.ffprobe.clone()));

    match run(&settings, probe, interrupted()).await {
        Ok(RunOutcome::DryRun { command }) => {
            println!("{}", command);
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Copied { clip, bytes }) => {
            info!(
                clip = %clip.display(),
                output = %settings.output.display(),
                bytes,
                "done (single clip copied)"
            );
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Rendered { clips, junctions }) => {
            info!(
                clips,
                junctions,
                output = %settings.output.display(),
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
