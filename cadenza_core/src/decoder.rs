// Note decoder: feature matrix back to absolute-time note events.
//
// Walks the matrix with a running onset clock starting at 0.0. Each vector's
// step is added to the clock to get the note's onset, and the clock then
// moves to that onset (not to the note's end), because step is an
// inter-onset interval. Durations and steps invert the encoder's
// log1p(x) / 5 with expm1(x * 5).
//
// Pitches are rounded and clamped into the model range here. This is the
// only clamp on pitch in the pipeline; encoded seeds may carry out-of-range
// values.
//
// Onsets are non-decreasing as long as every step feature is >= 0. That
// holds for encoded seeds (sorted onsets) and for generated notes (step is
// clamped to a positive floor).

use crate::features::{FeatureVector, Note, PitchRange, expand_time};

/// Decode features into notes with a fixed velocity.
pub fn decode(features: &[FeatureVector], range: &PitchRange, velocity: u8) -> Vec<Note> {
    let mut time = 0.0;
    features
        .iter()
        .map(|v| {
            let start = time + expand_time(v.step);
            let end = start + expand_time(v.duration);
            time = start;
            Note {
                pitch: range.denormalize(v.pitch),
                start,
                end,
                velocity,
            }
        })
        .collect()
}
