// Note events and the normalised feature space shared by encoder, models,
// generator and decoder.
//
// A raw `Note` lives in absolute seconds. A `FeatureVector` lives in the
// normalised space the models were trained on:
// - pitch:    linear rescale of the MIDI pitch into the piano range (21..=108)
// - step:     log1p(inter-onset gap in seconds) / 5
// - duration: log1p(note length in seconds) / 5
//
// The log transforms compress long gaps into a slowly growing value; dividing
// by `TIME_SCALE` keeps typical values well inside [0, 1]. `expand_time` is
// the exact inverse (expm1), so encode followed by decode reproduces times to
// floating-point tolerance.
//
// Pitch normalisation is deliberately unclamped here. Only the decoder clamps
// back into the range; see `decoder.rs`.

use serde::{Deserialize, Serialize};

/// Divisor applied after `log1p` for step and duration features.
pub const TIME_SCALE: f64 = 5.0;

/// A timed note event in absolute seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI pitch (0-127).
    pub pitch: u8,
    /// Onset in seconds.
    pub start: f64,
    /// Release in seconds.
    pub end: f64,
    /// Velocity (1-127).
    pub velocity: u8,
}

impl Note {
    pub fn new(pitch: u8, start: f64, end: f64, velocity: u8) -> Self {
        Note {
            pitch,
            start,
            end,
            velocity,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Inclusive MIDI pitch range covered by the pitch model's classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchRange {
    pub min: u8,
    pub max: u8,
}

impl Default for PitchRange {
    /// The 88-key piano range, A0 to C8.
    fn default() -> Self {
        PitchRange { min: 21, max: 108 }
    }
}

impl PitchRange {
    /// Number of pitch classes the pitch model scores.
    pub fn classes(&self) -> usize {
        (self.max - self.min) as usize + 1
    }

    /// Distance between the lowest and highest pitch, the normalisation divisor.
    pub fn span(&self) -> f64 {
        (self.max - self.min) as f64
    }

    pub fn contains(&self, pitch: u8) -> bool {
        (self.min..=self.max).contains(&pitch)
    }

    /// Map a MIDI pitch into feature space. Not clamped.
    pub fn normalize(&self, pitch: u8) -> f64 {
        (pitch as f64 - self.min as f64) / self.span()
    }

    /// Map a feature-space pitch back to MIDI, rounding to the nearest
    /// semitone and clamping into the range.
    pub fn denormalize(&self, pitch_norm: f64) -> u8 {
        let raw = (pitch_norm * self.span() + self.min as f64).round();
        if raw.is_nan() {
            return self.min;
        }
        raw.clamp(self.min as f64, self.max as f64) as u8
    }

    /// MIDI pitch for a model class index.
    pub fn class_to_pitch(&self, class: usize) -> Option<u8> {
        if class < self.classes() {
            Some(self.min + class as u8)
        } else {
            None
        }
    }

    /// Model class index for a MIDI pitch, if it falls inside the range.
    pub fn pitch_to_class(&self, pitch: u8) -> Option<usize> {
        self.contains(pitch).then(|| (pitch - self.min) as usize)
    }
}

/// Compress a non-negative time span into feature space.
pub fn compress_time(seconds: f64) -> f64 {
    seconds.ln_1p() / TIME_SCALE
}

/// Inverse of `compress_time`.
pub fn expand_time(feature: f64) -> f64 {
    (feature * TIME_SCALE).exp_m1()
}

/// One note in normalised feature space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub pitch: f64,
    pub step: f64,
    pub duration: f64,
}

impl FeatureVector {
    /// Layout used when a window is handed to a model as a `(len, 3)` tensor.
    pub fn to_array(&self) -> [f64; 3] {
        [self.pitch, self.step, self.duration]
    }
}

/// An ordered sequence of feature vectors (seed plus generated notes).
pub type FeatureMatrix = Vec<FeatureVector>;
