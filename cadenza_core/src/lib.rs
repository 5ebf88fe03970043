// Cadenza melody continuation
//
// Extends a short seed melody by predicting one note at a time from the notes
// before it. A pitch model supplies a categorical distribution over the 88
// piano keys, and a rhythm model regresses the next note's duration and
// inter-onset step. Pitches are drawn with temperature-controlled sampling;
// durations and steps are clamped and fed back as context.
//
// Architecture:
// - features.rs: Note events, PitchRange, the normalised feature space
//   (pitch rescale + log1p time compression) and its inverse
// - encoder.rs: Seed validation and notes -> feature matrix
// - sampling.rs: Temperature scaling and categorical draws over pitch classes
// - model.rs: PitchModel / RhythmModel inference traits, shared `Models`
//   handle, `Locked` adapter for non-thread-safe runtimes
// - baseline.rs: Built-in context-statistics models (no trained weights)
// - generator.rs: The autoregressive sliding-window loop + cancellation
// - decoder.rs: Feature matrix -> absolute-time notes
// - midi.rs: SMF parsing (tempo map, first instrument) and single-track output
// - config.rs: JSON-loadable generation / model / MIDI parameters
// - pipeline.rs: MIDI bytes in, continued MIDI bytes out
// - error.rs: Crate error type
//
// Given a fixed `SampleRng` seed and fixed models, output is deterministic.

pub mod baseline;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod features;
pub mod generator;
pub mod midi;
pub mod model;
pub mod pipeline;
pub mod sampling;

pub use error::{Error, Result};
