// Tunable parameters for a generation run.
//
// Everything the pipeline reads lives in `CadenzaConfig`. It can be loaded
// from JSON, and any field left out takes its default, so a config file only
// needs the values it changes. The binaries then layer command-line flags or
// query parameters on top.
//
// Groups:
// - `GenerationConfig`: steps, temperature, context window, seed truncation,
//   pitch range, and the clamp bounds applied to rhythm predictions.
// - `ModelConfig`: parameters of the built-in models in `baseline.rs`.
// - `MidiConfig`: output program, velocity and tempo.
//
// `validate()` runs before any inference. A bad value is reported as
// `Error::InvalidConfig` naming the field.

use crate::error::{Error, Result};
use crate::features::PitchRange;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Inclusive bounds a predicted feature is clamped into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClampRange {
    pub min: f64,
    pub max: f64,
}

impl ClampRange {
    pub fn apply(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(Error::InvalidConfig(format!(
                "{name} must satisfy min <= max with finite bounds, got [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Number of notes to append after the seed.
    pub steps: usize,
    /// Sampling temperature for the pitch distribution.
    pub temperature: f64,
    /// Trailing context length handed to the models.
    pub window: usize,
    /// Seed notes kept after sorting.
    pub max_notes: usize,
    pub pitch_range: PitchRange,
    /// Bounds for the predicted duration feature.
    pub duration_clamp: ClampRange,
    /// Bounds for the predicted inter-onset step feature. A positive floor
    /// keeps generated notes from stacking on the same onset.
    pub step_clamp: ClampRange,
    /// Reject seed notes outside `pitch_range` instead of warning.
    pub strict_pitch_range: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        GenerationConfig {
            steps: 200,
            temperature: 0.5,
            window: 50,
            max_notes: 50,
            pitch_range: PitchRange::default(),
            duration_clamp: ClampRange { min: 0.0, max: 1.0 },
            step_clamp: ClampRange {
                min: 0.05,
                max: 1.0,
            },
            strict_pitch_range: false,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "temperature must be finite and positive, got {}",
                self.temperature
            )));
        }
        if self.window == 0 {
            return Err(Error::InvalidConfig("window must be at least 1".into()));
        }
        if self.max_notes == 0 {
            return Err(Error::InvalidConfig("max_notes must be at least 1".into()));
        }
        if self.pitch_range.min >= self.pitch_range.max || self.pitch_range.max > 127 {
            return Err(Error::InvalidConfig(format!(
                "pitch_range must satisfy min < max <= 127, got {}..={}",
                self.pitch_range.min, self.pitch_range.max
            )));
        }
        self.duration_clamp.validate("duration_clamp")?;
        self.step_clamp.validate("step_clamp")?;
        // Decoded durations must not be negative and onsets must move forward.
        if self.duration_clamp.min < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "duration_clamp.min must be >= 0, got {}",
                self.duration_clamp.min
            )));
        }
        if self.step_clamp.min <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "step_clamp.min must be > 0, got {}",
                self.step_clamp.min
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Weight multiplier per note of age in the built-in models.
    pub recency_decay: f64,
    /// Pseudo-count per pitch class in the built-in pitch model.
    pub pitch_smoothing: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            recency_decay: 0.9,
            pitch_smoothing: 0.05,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.recency_decay > 0.0 && self.recency_decay <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "recency_decay must be in (0, 1], got {}",
                self.recency_decay
            )));
        }
        if !self.pitch_smoothing.is_finite() || self.pitch_smoothing < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "pitch_smoothing must be finite and non-negative, got {}",
                self.pitch_smoothing
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    /// General MIDI program for the output instrument (0 = acoustic grand).
    pub program: u8,
    /// Velocity for every decoded note.
    pub velocity: u8,
    /// Tempo written to the output file. Note times are in seconds, so this
    /// only affects how the file displays in a notation editor.
    pub tempo_bpm: f64,
}

impl Default for MidiConfig {
    fn default() -> Self {
        MidiConfig {
            program: 0,
            velocity: 100,
            tempo_bpm: 120.0,
        }
    }
}

impl MidiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.program > 127 {
            return Err(Error::InvalidConfig(format!(
                "program must be 0-127, got {}",
                self.program
            )));
        }
        if self.velocity == 0 || self.velocity > 127 {
            return Err(Error::InvalidConfig(format!(
                "velocity must be 1-127, got {}",
                self.velocity
            )));
        }
        if !self.tempo_bpm.is_finite() || self.tempo_bpm < 4.0 || self.tempo_bpm > 1000.0 {
            return Err(Error::InvalidConfig(format!(
                "tempo_bpm must be between 4 and 1000, got {}",
                self.tempo_bpm
            )));
        }
        Ok(())
    }
}

/// Complete configuration for a continuation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenzaConfig {
    pub generation: GenerationConfig,
    pub models: ModelConfig,
    pub midi: MidiConfig,
}

impl CadenzaConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: CadenzaConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.generation.validate()?;
        self.models.validate()?;
        self.midi.validate()
    }
}
