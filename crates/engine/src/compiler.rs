//! Transition graph compiler.
//!
//! Turns an ordered clip list and a [`TransitionSpec`] into a [`GraphPlan`]:
//! one crossfade junction per adjacent clip pair, each starting at the
//! preceding clip's own duration minus the transition length.
//!
//! [`compile`] is pure and needs every consumed duration already resolved.
//! [`compile_with_probe`] resolves the missing ones first.

use crate::plan::{Clip, GraphPlan, JunctionPlan, StreamLabel, TransitionSpec};
use crate::probe::{resolve_durations, DurationProbe, ProbeError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Error type for graph compilation
#[derive(Debug, Error)]
pub enum CompileError {
    /// Fewer than two clips to join
    #[error("At least two clips are required, found {found}")]
    InsufficientInputs { found: usize },

    /// Transition duration is zero, negative or not finite
    #[error("Transition duration must be a positive number of seconds, got {0}")]
    InvalidDuration(f64),

    /// No effect names given
    #[error("Effect list is empty")]
    InvalidEffectList,

    /// Frame rate for two-clip normalization is zero
    #[error("Frame rate must be positive, got {0}")]
    InvalidFrameRate(u32),

    /// A clip reached the compiler without a probed duration
    #[error("Duration of {} has not been resolved", .0.display())]
    UnresolvedDuration(PathBuf),

    /// Duration lookup failed
    #[error(transparent)]
    Probe(#[from] ProbeError),
}

/// Checks the inputs that do not need any durations.
///
/// Checked in order: clip count, transition duration, effect list, frame rate.
pub fn validate(clip_count: usize, spec: &TransitionSpec) -> Result<(), CompileError> {
    if clip_count < 2 {
        return Err(CompileError::InsufficientInputs { found: clip_count });
    }

    let t = spec.transition_duration;
    if !t.is_finite() || t <= 0.0 {
        return Err(CompileError::InvalidDuration(t));
    }

    if spec.effects.is_empty() {
        return Err(CompileError::InvalidEffectList);
    }

    if spec.frame_rate == 0 {
        return Err(CompileError::InvalidFrameRate(spec.frame_rate));
    }

    Ok(())
}

fn required_duration(clip: &Clip) -> Result<f64, CompileError> {
    clip.duration
        .ok_or_else(|| CompileError::UnresolvedDuration(clip.path.clone()))
}

fn effect_at(spec: &TransitionSpec, k: usize) -> Result<String, CompileError> {
    spec.effect_for(k)
        .map(String::from)
        .ok_or(CompileError::InvalidEffectList)
}

/// Compiles the transition graph for `clips`.
///
/// Every clip except the last must carry a duration. Clips are never
/// reordered. A transition longer than its preceding clip yields a negative
/// offset, which is kept as-is and logged.
///
/// Two clips get a single junction between frame-rate-normalized inputs.
/// Longer lists chain junctions: junction `i` takes the previous junction's
/// output (or raw clip 0) on the left and raw clip `i` on the right, writing
/// intermediate `v<i>`, except the last junction which writes the output label.
pub fn compile(clips: &[Clip], spec: &TransitionSpec) -> Result<GraphPlan, CompileError> {
    validate(clips.len(), spec)?;

    let n = clips.len();
    let t = spec.transition_duration;
    let inputs: Vec<PathBuf> = clips.iter().map(|c| c.path.clone()).collect();
    let mut junctions = Vec::with_capacity(n - 1);

    let normalize_frame_rate = if n == 2 {
        junctions.push(JunctionPlan {
            effect: effect_at(spec, 0)?,
            offset_seconds: required_duration(&clips[0])? - t,
            left: StreamLabel::Normalized(0),
            right: StreamLabel::Normalized(1),
            output: StreamLabel::Output,
        });
        Some(spec.frame_rate)
    } else {
        let mut left = StreamLabel::Input {
            index: 0,
            path: clips[0].path.clone(),
        };

        for i in 1..n {
            let output = if i == n - 1 {
                StreamLabel::Output
            } else {
                StreamLabel::Intermediate(i)
            };

            junctions.push(JunctionPlan {
                effect: effect_at(spec, i - 1)?,
                offset_seconds: required_duration(&clips[i - 1])? - t,
                left,
                right: StreamLabel::Input {
                    index: i,
                    path: clips[i].path.clone(),
                },
                output: output.clone(),
            });

            left = output;
        }
        None
    };

    for (k, junction) in junctions.iter().enumerate() {
        if junction.offset_seconds < 0.0 {
            warn!(
                junction = k + 1,
                offset = junction.offset_seconds,
                transition = t,
                clip = %clips[k].path.display(),
                "transition is longer than the preceding clip; passing negative offset through"
            );
        }
        debug!(
            junction = k + 1,
            effect = %junction.effect,
            offset = junction.offset_seconds,
            "planned junction"
        );
    }

    Ok(GraphPlan::new(inputs, junctions, t, normalize_frame_rate))
}

/// Validates, resolves the durations the compiler needs, then compiles.
///
/// Only clips `0..n-1` are probed; the last clip's duration is never used.
/// Probes run concurrently. A failed probe aborts before any plan exists.
pub async fn compile_with_probe<P>(
    clips: &[Clip],
    spec: &TransitionSpec,
    probe: Arc<P>,
) -> Result<GraphPlan, CompileError>
where
    P: DurationProbe + 'static,
{
    validate(clips.len(), spec)?;

    let (needed, last) = clips.split_at(clips.len() - 1);
    let mut resolved = resolve_durations(needed, probe).await?;
    resolved.extend_from_slice(last);

    compile(&resolved, spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::{HashMap, HashSet};
    use std::path::Path;
    use std::sync::Mutex;

    fn clips_with(durations: &[f64]) -> Vec<Clip> {
        durations
            .iter()
            .enumerate()
            .map(|(i, d)| Clip::with_duration(PathBuf::from(format!("clip{}.mp4", i)), i, *d))
            .collect()
    }

    fn spec(t: f64, effects: &[&str]) -> TransitionSpec {
        TransitionSpec::new(t, effects.iter().map(|e| e.to_string()).collect())
    }

    /// Probe that records which paths were asked for.
    struct RecordingProbe {
        durations: HashMap<PathBuf, f64>,
        asked: Mutex<Vec<PathBuf>>,
    }

    impl RecordingProbe {
        fn new(entries: &[(&str, f64)]) -> Self {
            Self {
                durations: entries
                    .iter()
                    .map(|(p, d)| (PathBuf::from(*p), *d))
                    .collect(),
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    impl DurationProbe for RecordingProbe {
        fn probe_duration(&self, path: &Path) -> Result<f64, ProbeError> {
            self.asked.lock().unwrap().push(path.to_path_buf());
            self.durations
                .get(path)
                .copied()
                .ok_or_else(|| ProbeError::Failed(format!("cannot decode {}", path.display())))
        }
    }

    #[test]
    fn test_offsets_use_preceding_clip_only() {
        let plan = compile(&clips_with(&[10.0, 8.0, 12.0]), &spec(2.0, &["fade"])).unwrap();
        let offsets: Vec<f64> = plan.junctions().iter().map(|j| j.offset_seconds).collect();
        assert_eq!(offsets, vec![8.0, 6.0]);
    }

    #[test]
    fn test_effects_cycle_across_junctions() {
        let plan = compile(
            &clips_with(&[5.0, 5.0, 5.0, 5.0]),
            &spec(1.0, &["fade", "wipeleft"]),
        )
        .unwrap();
        let effects: Vec<&str> = plan.junctions().iter().map(|j| j.effect.as_str()).collect();
        assert_eq!(effects, vec!["fade", "wipeleft", "fade"]);
    }

    #[test]
    fn test_two_clips_single_normalized_junction() {
        let plan = compile(&clips_with(&[7.5, 3.0]), &spec(1.5, &["slideup", "fade"])).unwrap();

        assert_eq!(plan.junctions().len(), 1);
        let junction = &plan.junctions()[0];
        assert_eq!(junction.offset_seconds, 6.0);
        assert_eq!(junction.effect, "slideup");
        assert_eq!(junction.left, StreamLabel::Normalized(0));
        assert_eq!(junction.right, StreamLabel::Normalized(1));
        assert_eq!(junction.output, StreamLabel::Output);
        assert_eq!(plan.normalize_frame_rate(), Some(30));

        assert_eq!(
            plan.filter_expression(),
            "[0:v]fps=30[f0];[1:v]fps=30[f1];\
             [f0][f1]xfade=transition=slideup:duration=1.5:offset=6[vout]"
        );
    }

    #[test]
    fn test_two_clips_custom_frame_rate() {
        let plan = compile(
            &clips_with(&[4.0, 4.0]),
            &spec(1.0, &["fade"]).with_frame_rate(25),
        )
        .unwrap();
        assert!(plan.filter_expression().starts_with("[0:v]fps=25[f0];[1:v]fps=25[f1];"));
    }

    #[test]
    fn test_chain_labels_and_expression() {
        let plan = compile(&clips_with(&[10.0, 8.0, 12.0]), &spec(2.0, &["fade", "wipeleft"])).unwrap();

        let first = &plan.junctions()[0];
        assert_eq!(first.left.input_path(), Some(Path::new("clip0.mp4")));
        assert_eq!(first.right.input_path(), Some(Path::new("clip1.mp4")));
        assert_eq!(first.output, StreamLabel::Intermediate(1));

        let second = &plan.junctions()[1];
        assert_eq!(second.left, StreamLabel::Intermediate(1));
        assert_eq!(second.right.input_path(), Some(Path::new("clip2.mp4")));
        assert_eq!(second.output, StreamLabel::Output);

        assert_eq!(plan.normalize_frame_rate(), None);
        assert_eq!(plan.output_label(), &StreamLabel::Output);
        assert_eq!(
            plan.filter_expression(),
            "[0:v][1:v]xfade=transition=fade:duration=2:offset=8[v1];\
             [v1][2:v]xfade=transition=wipeleft:duration=2:offset=6[vout]"
        );
    }

    #[test]
    fn test_inputs_keep_caller_order() {
        let clips = vec![
            Clip::with_duration(PathBuf::from("z.mp4"), 0, 3.0),
            Clip::with_duration(PathBuf::from("a.mp4"), 1, 3.0),
            Clip::with_duration(PathBuf::from("m.mp4"), 2, 3.0),
        ];
        let plan = compile(&clips, &spec(1.0, &["fade"])).unwrap();
        assert_eq!(
            plan.inputs(),
            &[PathBuf::from("z.mp4"), PathBuf::from("a.mp4"), PathBuf::from("m.mp4")]
        );
    }

    #[test]
    fn test_insufficient_inputs() {
        for n in 0..2 {
            let err = compile(&clips_with(&vec![5.0; n]), &spec(1.0, &["fade"])).unwrap_err();
            assert!(matches!(err, CompileError::InsufficientInputs { found } if found == n));
        }
    }

    #[test]
    fn test_invalid_transition_duration() {
        for t in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = compile(&clips_with(&[5.0, 5.0]), &spec(t, &["fade"])).unwrap_err();
            assert!(matches!(err, CompileError::InvalidDuration(_)));
        }
    }

    #[test]
    fn test_empty_effect_list() {
        let err = compile(&clips_with(&[5.0, 5.0]), &spec(1.0, &[])).unwrap_err();
        assert!(matches!(err, CompileError::InvalidEffectList));
    }

    #[test]
    fn test_zero_frame_rate() {
        let err = compile(&clips_with(&[5.0, 5.0]), &spec(1.0, &["fade"]).with_frame_rate(0))
            .unwrap_err();
        assert!(matches!(err, CompileError::InvalidFrameRate(0)));
    }

    #[test]
    fn test_validation_order_inputs_first() {
        let err = compile(&clips_with(&[5.0]), &spec(-1.0, &[])).unwrap_err();
        assert!(matches!(err, CompileError::InsufficientInputs { found: 1 }));
        let err = compile(&clips_with(&[5.0, 5.0]), &spec(-1.0, &[])).unwrap_err();
        assert!(matches!(err, CompileError::InvalidDuration(_)));
    }

    #[test]
    fn test_unresolved_duration() {
        let clips = vec![
            Clip::with_duration(PathBuf::from("a.mp4"), 0, 5.0),
            Clip::new(PathBuf::from("b.mp4"), 1),
            Clip::new(PathBuf::from("c.mp4"), 2),
        ];
        let err = compile(&clips, &spec(1.0, &["fade"])).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedDuration(p) if p == Path::new("b.mp4")));
    }

    #[test]
    fn test_last_clip_duration_not_required() {
        let mut clips = clips_with(&[5.0, 5.0, 5.0]);
        clips[2].duration = None;
        assert!(compile(&clips, &spec(1.0, &["fade"])).is_ok());
    }

    #[test]
    fn test_transition_longer_than_clip_keeps_negative_offset() {
        let plan = compile(&clips_with(&[1.0, 5.0, 5.0]), &spec(2.5, &["fade"])).unwrap();
        assert_eq!(plan.junctions()[0].offset_seconds, -1.5);
        assert!(plan.filter_expression().contains("offset=-1.5[v1]"));
    }

    #[tokio::test]
    async fn test_compile_with_probe_skips_last_clip() {
        let probe = Arc::new(RecordingProbe::new(&[("a.mp4", 10.0), ("b.mp4", 8.0)]));
        let clips = Clip::sequence(["a.mp4", "b.mp4", "c.mp4"].map(PathBuf::from));

        let plan = compile_with_probe(&clips, &spec(2.0, &["fade"]), probe.clone())
            .await
            .unwrap();

        let offsets: Vec<f64> = plan.junctions().iter().map(|j| j.offset_seconds).collect();
        assert_eq!(offsets, vec![8.0, 6.0]);

        let mut asked = probe.asked.lock().unwrap().clone();
        asked.sort();
        assert_eq!(asked, vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")]);
    }

    #[tokio::test]
    async fn test_compile_with_probe_propagates_probe_error() {
        let probe = Arc::new(RecordingProbe::new(&[("a.mp4", 10.0)]));
        let clips = Clip::sequence(["a.mp4", "corrupt.mp4", "c.mp4"].map(PathBuf::from));

        let err = compile_with_probe(&clips, &spec(2.0, &["fade"]), probe)
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::Probe(ProbeError::Failed(_))));
    }

    #[tokio::test]
    async fn test_compile_with_probe_validates_before_probing() {
        let probe = Arc::new(RecordingProbe::new(&[]));
        let clips = Clip::sequence(["only.mp4"].map(PathBuf::from));

        let err = compile_with_probe(&clips, &spec(1.0, &["fade"]), probe.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, CompileError::InsufficientInputs { found: 1 }));
        assert!(probe.asked.lock().unwrap().is_empty());
    }

    fn durations_strategy() -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(2.0f64..120.0, 2..24)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_one_junction_per_adjacent_pair(
            durations in durations_strategy(),
            t in 0.1f64..2.0,
        ) {
            let plan = compile(&clips_with(&durations), &spec(t, &["fade"])).unwrap();
            prop_assert_eq!(plan.junctions().len(), durations.len() - 1);
            prop_assert_eq!(plan.inputs().len(), durations.len());
        }

        #[test]
        fn prop_offsets_match_preceding_duration(
            durations in durations_strategy(),
            t in 0.1f64..2.0,
        ) {
            let plan = compile(&clips_with(&durations), &spec(t, &["fade"])).unwrap();
            for (k, junction) in plan.junctions().iter().enumerate() {
                prop_assert_eq!(junction.offset_seconds, durations[k] - t);
            }
        }

        #[test]
        fn prop_effects_are_cyclic(
            durations in durations_strategy(),
            effects in prop::collection::vec("[a-z]{2,10}", 1..5),
        ) {
            let names: Vec<&str> = effects.iter().map(String::as_str).collect();
            let plan = compile(&clips_with(&durations), &spec(1.0, &names)).unwrap();
            for (k, junction) in plan.junctions().iter().enumerate() {
                prop_assert_eq!(&junction.effect, &effects[k % effects.len()]);
            }
        }

        #[test]
        fn prop_intermediate_labels_unique(durations in prop::collection::vec(2.0f64..60.0, 3..24)) {
            let n = durations.len();
            let plan = compile(&clips_with(&durations), &spec(1.0, &["fade"])).unwrap();

            let intermediates: HashSet<StreamLabel> = plan
                .junctions()
                .iter()
                .map(|j| j.output.clone())
                .filter(|l| matches!(l, StreamLabel::Intermediate(_)))
                .collect();
            prop_assert_eq!(intermediates.len(), n - 2);

            let finals = plan
                .junctions()
                .iter()
                .filter(|j| j.output == StreamLabel::Output)
                .count();
            prop_assert_eq!(finals, 1);
            prop_assert_eq!(&plan.junctions()[n - 2].output, &StreamLabel::Output);

            // Each junction consumes exactly the previous junction's output
            for pair in plan.junctions().windows(2) {
                prop_assert_eq!(&pair[1].left, &pair[0].output);
            }
        }

        #[test]
        fn prop_compile_is_deterministic(
            durations in durations_strategy(),
            t in 0.1f64..2.0,
            effects in prop::collection::vec("[a-z]{2,10}", 1..5),
        ) {
            let names: Vec<&str> = effects.iter().map(String::as_str).collect();
            let first = compile(&clips_with(&durations), &spec(t, &names)).unwrap();
            let second = compile(&clips_with(&durations), &spec(t, &names)).unwrap();
            prop_assert_eq!(first.filter_expression(), second.filter_expression());
            prop_assert_eq!(first, second);
        }
    }
}
