//! Probe module for looking up clip durations.
//!
//! Durations come from ffprobe's JSON output. Lookups for distinct clips are
//! independent, so [`resolve_durations`] issues them concurrently and gathers
//! the results back into clip order.

use crate::config::normalize_decimal;
use crate::plan::Clip;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe ran but rejected the file.
    #[error("ffprobe failed: {0}")]
    Failed(String),

    /// ffprobe output could not be read as a duration.
    #[error("Failed to parse ffprobe output: {0}")]
    Parse(String),

    /// ffprobe reported no container duration.
    #[error("ffprobe reported no duration for {}", .0.display())]
    MissingDuration(PathBuf),

    /// A probe task panicked or was cancelled.
    #[error("Probe task failed: {0}")]
    Task(String),

    /// IO error during probe.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of clip durations.
pub trait DurationProbe: Send + Sync {
    /// Duration of the clip at `path`, in seconds.
    fn probe_duration(&self, path: &Path) -> Result<f64, ProbeError>;
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub duration: Option<String>,
    }
}

/// [`DurationProbe`] backed by the ffprobe binary.
#[derive(Debug, Clone)]
pub struct FfprobeDuration {
    /// ffprobe executable name or path.
    pub program: PathBuf,
}

impl Default for FfprobeDuration {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffprobe"),
        }
    }
}

impl FfprobeDuration {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DurationProbe for FfprobeDuration {
    /// Runs `ffprobe -v error -print_format json -show_format <path>`
    /// and reads `format.duration`.
    fn probe_duration(&self, path: &Path) -> Result<f64, ProbeError> {
        let output = Command::new(&self.program)
            .args(["-v", "error", "-print_format", "json", "-show_format"])
            .arg(path)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Failed(format!(
                "{}: ffprobe exited with status {}: {}",
                path.display(),
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_ffprobe_output(&stdout)? {
            Some(secs) => Ok(secs),
            None => Err(ProbeError::MissingDuration(path.to_path_buf())),
        }
    }
}

/// Reads the container duration out of ffprobe JSON output.
///
/// Returns `Ok(None)` when ffprobe produced valid JSON without a duration.
pub fn parse_ffprobe_output(json_str: &str) -> Result<Option<f64>, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::Parse(e.to_string()))?;

    match ffprobe.format.and_then(|f| f.duration) {
        Some(text) => parse_duration_text(&text).map(Some),
        None => Ok(None),
    }
}

/// Parses a duration as printed by ffprobe.
///
/// Tolerates surrounding whitespace and newlines, fixed-point padding
/// (`"12.000000"`), a decimal comma, and a leading `duration=` key.
pub fn parse_duration_text(text: &str) -> Result<f64, ProbeError> {
    let trimmed = text.trim();
    let value = trimmed
        .strip_prefix("duration=")
        .unwrap_or(trimmed)
        .trim();

    match normalize_decimal(value).parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => Ok(secs),
        _ => Err(ProbeError::Parse(format!("not a duration: {:?}", text))),
    }
}

/// Default cap on probes in flight: one per CPU core, clamped to 2..=16.
pub fn probe_concurrency() -> usize {
    num_cpus::get().clamp(2, 16)
}

/// Fills in missing durations for `clips`, probing concurrently.
///
/// Runs at most [`probe_concurrency`] probes at once; see
/// [`resolve_durations_with_limit`].
pub async fn resolve_durations<P>(clips: &[Clip], probe: Arc<P>) -> Result<Vec<Clip>, ProbeError>
where
    P: DurationProbe + 'static,
{
    resolve_durations_with_limit(clips, probe, probe_concurrency()).await
}

/// Fills in missing durations for `clips` with at most `limit` probes in flight.
///
/// One blocking task is spawned per clip that still needs a duration, each
/// holding a semaphore permit until its probe returns. Results are written
/// back by index so clip order is preserved. The first error aborts the
/// remaining probes and is returned as-is.
pub async fn resolve_durations_with_limit<P>(
    clips: &[Clip],
    probe: Arc<P>,
    limit: usize,
) -> Result<Vec<Clip>, ProbeError>
where
    P: DurationProbe + 'static,
{
    let mut resolved = clips.to_vec();
    let mut tasks = JoinSet::new();
    let permits = Arc::new(Semaphore::new(limit.max(1)));

    for (slot, clip) in clips.iter().enumerate() {
        if clip.duration.is_some() {
            continue;
        }
        let permit = Arc::clone(&permits)
            .acquire_owned()
            .await
            .map_err(|e| ProbeError::Task(e.to_string()))?;
        let probe = Arc::clone(&probe);
        let path = clip.path.clone();
        tasks.spawn_blocking(move || {
            let result = probe.probe_duration(&path);
            drop(permit);
            (slot, path, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (slot, path, result) = joined.map_err(|e| ProbeError::Task(e.to_string()))?;
        match result {
            Ok(secs) => {
                debug!(clip = %path.display(), duration = secs, "probed clip duration");
                resolved[slot].duration = Some(secs);
            }
            Err(e) => {
                tasks.abort_all();
                return Err(e);
            }
        }
    }

    Ok(resolved)
}
