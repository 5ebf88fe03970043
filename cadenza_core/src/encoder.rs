// Note encoder: raw note events to the seed feature matrix.
//
// `encode` sorts by onset, keeps the first `max_notes` notes and maps each one
// into feature space. The step feature measures the gap from the previous
// note's onset (0.0 before the first note), matching what the models saw in
// training. `max_notes` also bounds the seed to the training window size.
//
// `validate_seed` is the gate the pipeline runs first. Negative gaps and
// durations would hand `log1p` an argument below zero (NaN below -1), so bad
// timing is rejected here instead of surfacing as NaN features mid-generation.
// Pitches outside the model range are only warned about unless `strict` is
// set: the decoder clamps them anyway, and whether they are a mistake depends
// on the caller.

use crate::error::{Error, Result};
use crate::features::{FeatureMatrix, FeatureVector, Note, PitchRange, compress_time};
use tracing::{debug, warn};

/// Encode notes into feature space, oldest first.
pub fn encode(notes: &[Note], max_notes: usize, range: &PitchRange) -> FeatureMatrix {
    let mut sorted = notes.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));
    sorted.truncate(max_notes);

    let mut features = Vec::with_capacity(sorted.len());
    let mut previous_start = 0.0;
    for note in &sorted {
        features.push(FeatureVector {
            pitch: range.normalize(note.pitch),
            step: compress_time(note.start - previous_start),
            duration: compress_time(note.end - note.start),
        });
        previous_start = note.start;
    }

    debug!(
        "Encoded {} of {} seed notes (max_notes = {})",
        features.len(),
        notes.len(),
        max_notes
    );
    features
}

/// Reject seeds the encoder cannot represent. Never modifies the notes.
pub fn validate_seed(notes: &[Note], range: &PitchRange, strict: bool) -> Result<()> {
    if notes.is_empty() {
        return Err(Error::EmptySeed);
    }

    let mut out_of_range = 0usize;
    for (i, note) in notes.iter().enumerate() {
        if !note.start.is_finite() || !note.end.is_finite() {
            return Err(Error::InvalidSeed(format!(
                "note {i} has a non-finite time ({} -> {})",
                note.start, note.end
            )));
        }
        if note.start < 0.0 {
            return Err(Error::InvalidSeed(format!(
                "note {i} starts before zero ({})",
                note.start
            )));
        }
        if note.end < note.start {
            return Err(Error::InvalidSeed(format!(
                "note {i} ends before it starts ({} -> {})",
                note.start, note.end
            )));
        }
        if !range.contains(note.pitch) {
            if strict {
                return Err(Error::InvalidSeed(format!(
                    "note {i} has pitch {} outside {}..={}",
                    note.pitch, range.min, range.max
                )));
            }
            out_of_range += 1;
        }
    }

    if out_of_range > 0 {
        warn!(
            "{} seed note(s) fall outside pitch range {}..={}; they will be clamped on output",
            out_of_range, range.min, range.max
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::expand_time;
    use approx::assert_relative_eq;

    fn seed() -> Vec<Note> {
        vec![
            Note::new(60, 0.0, 0.5, 100),
            Note::new(64, 0.5, 1.0, 100),
            Note::new(67, 1.0, 1.3, 100),
        ]
    }

    #[test]
    fn empty_input_gives_empty_matrix() {
        assert!(encode(&[], 50, &PitchRange::default()).is_empty());
    }

    #[test]
    fn first_step_measured_from_zero() {
        let notes = [Note::new(60, 0.75, 1.0, 100)];
        let features = encode(&notes, 50, &PitchRange::default());
        assert_relative_eq!(expand_time(features[0].step), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn steps_are_inter_onset_gaps() {
        let features = encode(&seed(), 50, &PitchRange::default());
        assert_eq!(features.len(), 3);
        assert_eq!(features[0].step, 0.0);
        assert_relative_eq!(expand_time(features[1].step), 0.5, epsilon = 1e-12);
        assert_relative_eq!(expand_time(features[2].step), 0.5, epsilon = 1e-12);
        assert_relative_eq!(expand_time(features[2].duration), 0.3, epsilon = 1e-12);
        assert_relative_eq!(features[0].pitch, 39.0 / 87.0);
    }

    #[test]
    fn resorts_before_truncating() {
        let mut notes = seed();
        notes.reverse();
        let features = encode(&notes, 2, &PitchRange::default());
        assert_eq!(features.len(), 2);
        let range = PitchRange::default();
        assert_eq!(range.denormalize(features[0].pitch), 60);
        assert_eq!(range.denormalize(features[1].pitch), 64);
    }

    #[test]
    fn out_of_range_pitch_is_not_clamped() {
        let notes = [Note::new(12, 0.0, 0.5, 100)];
        let features = encode(&notes, 50, &PitchRange::default());
        assert!(features[0].pitch < 0.0);
    }

    #[test]
    fn validate_rejects_empty() {
        let err = validate_seed(&[], &PitchRange::default(), false).unwrap_err();
        assert!(matches!(err, Error::EmptySeed));
    }

    #[test]
    fn validate_rejects_bad_timing() {
        let range = PitchRange::default();
        let backwards = [Note::new(60, 1.0, 0.5, 100)];
        assert!(matches!(
            validate_seed(&backwards, &range, false),
            Err(Error::InvalidSeed(_))
        ));
        let negative = [Note::new(60, -0.1, 0.5, 100)];
        assert!(validate_seed(&negative, &range, false).is_err());
        let nan = [Note::new(60, f64::NAN, 0.5, 100)];
        assert!(validate_seed(&nan, &range, false).is_err());
    }

    #[test]
    fn validate_pitch_range_strictness() {
        let range = PitchRange::default();
        let low = [Note::new(10, 0.0, 0.5, 100)];
        assert!(validate_seed(&low, &range, false).is_ok());
        assert!(matches!(
            validate_seed(&low, &range, true),
            Err(Error::InvalidSeed(_))
        ));
    }

    #[test]
    fn validate_accepts_unsorted_notes() {
        let mut notes = seed();
        notes.swap(0, 2);
        assert!(validate_seed(&notes, &PitchRange::default(), true).is_ok());
    }
}
