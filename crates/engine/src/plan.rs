//! Graph plan types and their serialization to the transcoder's filter syntax.
//!
//! A [`GraphPlan`] is built once by the compiler and never mutated. All
//! knowledge of the filtergraph text format lives in this module.

use std::fmt;
use std::path::{Path, PathBuf};

/// One clip in the output sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    /// Path to the clip on disk.
    pub path: PathBuf,
    /// Position in the output sequence.
    pub sequence_index: usize,
    /// Duration in seconds, once probed.
    pub duration: Option<f64>,
}

impl Clip {
    /// Create a clip whose duration is not yet known
    pub fn new(path: PathBuf, sequence_index: usize) -> Self {
        Self {
            path,
            sequence_index,
            duration: None,
        }
    }

    /// Create a clip with an already known duration
    pub fn with_duration(path: PathBuf, sequence_index: usize, duration: f64) -> Self {
        Self {
            path,
            sequence_index,
            duration: Some(duration),
        }
    }

    /// Number paths in order.
    pub fn sequence(paths: impl IntoIterator<Item = PathBuf>) -> Vec<Clip> {
        paths
            .into_iter()
            .enumerate()
            .map(|(i, path)| Clip::new(path, i))
            .collect()
    }
}

/// How each junction is rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionSpec {
    /// Transition length in seconds; must be positive.
    pub transition_duration: f64,
    /// Effect names, reused cyclically across junctions.
    pub effects: Vec<String>,
    /// Frame rate both inputs are normalized to when exactly two clips are joined.
    pub frame_rate: u32,
}

impl TransitionSpec {
    pub fn new(transition_duration: f64, effects: Vec<String>) -> Self {
        Self {
            transition_duration,
            effects,
            frame_rate: 30,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: u32) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Effect for the zero-based junction `k`.
    ///
    /// Returns `None` only when the effect list is empty.
    pub fn effect_for(&self, k: usize) -> Option<&str> {
        if self.effects.is_empty() {
            return None;
        }
        Some(self.effects[k % self.effects.len()].as_str())
    }
}

/// A named stream inside the filtergraph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamLabel {
    /// Video of the raw input clip at `index`.
    Input { index: usize, path: PathBuf },
    /// Input `index` after frame-rate normalization.
    Normalized(usize),
    /// Composited stream produced by an inner junction.
    Intermediate(usize),
    /// The final composited stream that gets mapped to the output file.
    Output,
}

impl StreamLabel {
    /// Raw clip path, for input labels.
    pub fn input_path(&self) -> Option<&Path> {
        match self {
            StreamLabel::Input { path, .. } => Some(path.as_path()),
            _ => None,
        }
    }
}

impl fmt::Display for StreamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamLabel::Input { index, .. } => write!(f, "[{}:v]", index),
            StreamLabel::Normalized(index) => write!(f, "[f{}]", index),
            StreamLabel::Intermediate(n) => write!(f, "[v{}]", n),
            StreamLabel::Output => write!(f, "[vout]"),
        }
    }
}

/// One crossfade between adjacent clips.
#[derive(Debug, Clone, PartialEq)]
pub struct JunctionPlan {
    pub effect: String,
    /// Start of the transition, measured on the left input's timeline.
    pub offset_seconds: f64,
    pub left: StreamLabel,
    pub right: StreamLabel,
    pub output: StreamLabel,
}

impl JunctionPlan {
    /// Filter expression for this junction alone.
    pub fn expression(&self, transition_duration: f64) -> String {
        format!(
            "{}{}xfade=transition={}:duration={}:offset={}{}",
            self.left, self.right, self.effect, transition_duration, self.offset_seconds, self.output
        )
    }
}

/// Compiled transition graph for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphPlan {
    inputs: Vec<PathBuf>,
    junctions: Vec<JunctionPlan>,
    transition_duration: f64,
    normalize_frame_rate: Option<u32>,
    output: StreamLabel,
}

impl GraphPlan {
    pub(crate) fn new(
        inputs: Vec<PathBuf>,
        junctions: Vec<JunctionPlan>,
        transition_duration: f64,
        normalize_frame_rate: Option<u32>,
    ) -> Self {
        Self {
            inputs,
            junctions,
            transition_duration,
            normalize_frame_rate,
            output: StreamLabel::Output,
        }
    }

    /// Clip paths in their original order.
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn junctions(&self) -> &[JunctionPlan] {
        &self.junctions
    }

    pub fn transition_duration(&self) -> f64 {
        self.transition_duration
    }

    /// Frame rate inputs are normalized to before crossfading, if any.
    pub fn normalize_frame_rate(&self) -> Option<u32> {
        self.normalize_frame_rate
    }

    /// Label to map to the output file.
    pub fn output_label(&self) -> &StreamLabel {
        &self.output
    }

    /// Serializes the whole plan into a single filtergraph expression.
    ///
    /// Stages are `;`-separated: frame-rate normalization first (two-clip
    /// plans only), then one `xfade` per junction in junction order.
    pub fn filter_expression(&self) -> String {
        let mut stages = Vec::with_capacity(self.junctions.len() + self.inputs.len());

        if let Some(fps) = self.normalize_frame_rate {
            for (index, path) in self.inputs.iter().enumerate() {
                let input = StreamLabel::Input {
                    index,
                    path: path.clone(),
                };
                stages.push(format!(
                    "{}fps={}{}",
                    input,
                    fps,
                    StreamLabel::Normalized(index)
                ));
            }
        }

        stages.extend(
            self.junctions
                .iter()
                .map(|j| j.expression(self.transition_duration)),
        );

        stages.join(";")
    }
}
