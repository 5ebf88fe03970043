// Built-in context-statistics models.
//
// These implement the same black-box contracts as a trained network so the
// CLI and server run out of the box, and so tests have a realistic model
// with non-trivial output. They are not trained and load no weights:
// - HistogramPitchModel: recency-weighted histogram of the window's pitches
//   plus additive smoothing, so every class keeps some probability and the
//   sampler can still wander at higher temperatures.
// - MeanRhythmModel: recency-weighted mean of the window's step and duration
//   features, which keeps the generated rhythm close to the seed's feel.
//
// Recency weighting: the newest note has weight 1, the one before it
// `decay`, then `decay^2`, and so on.

use crate::config::ModelConfig;
use crate::features::{FeatureVector, PitchRange};
use crate::model::{Models, PitchModel, RhythmModel, RhythmPrediction};

/// Pitch model built from the pitches already in the window.
#[derive(Debug, Clone)]
pub struct HistogramPitchModel {
    pub range: PitchRange,
    /// Per-note recency decay in (0, 1].
    pub decay: f64,
    /// Pseudo-count added to every class.
    pub smoothing: f64,
}

impl HistogramPitchModel {
    pub fn from_config(range: PitchRange, config: &ModelConfig) -> Self {
        HistogramPitchModel {
            range,
            decay: config.recency_decay,
            smoothing: config.pitch_smoothing,
        }
    }
}

impl PitchModel for HistogramPitchModel {
    fn predict_pitch(&self, window: &[FeatureVector]) -> Result<Vec<f64>, String> {
        let mut weights = vec![self.smoothing; self.range.classes()];
        let mut w = 1.0;
        for v in window.iter().rev() {
            let pitch = self.range.denormalize(v.pitch);
            if let Some(class) = self.range.pitch_to_class(pitch) {
                weights[class] += w;
            }
            w *= self.decay;
        }

        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            // No smoothing and no context: fall back to uniform.
            let uniform = 1.0 / weights.len() as f64;
            return Ok(vec![uniform; weights.len()]);
        }
        Ok(weights.into_iter().map(|x| x / total).collect())
    }
}

/// Rhythm model that predicts the recency-weighted mean of the window.
#[derive(Debug, Clone)]
pub struct MeanRhythmModel {
    pub decay: f64,
}

impl MeanRhythmModel {
    pub fn from_config(config: &ModelConfig) -> Self {
        MeanRhythmModel {
            decay: config.recency_decay,
        }
    }
}

impl RhythmModel for MeanRhythmModel {
    fn predict_rhythm(&self, window: &[FeatureVector]) -> Result<RhythmPrediction, String> {
        if window.is_empty() {
            return Err("rhythm model needs at least one note of context".into());
        }

        let (mut step, mut duration, mut norm) = (0.0, 0.0, 0.0);
        let mut w = 1.0;
        for v in window.iter().rev() {
            step += w * v.step;
            duration += w * v.duration;
            norm += w;
            w *= self.decay;
        }
        Ok(RhythmPrediction {
            duration: duration / norm,
            step: step / norm,
        })
    }
}

/// The default model pair used when no external models are supplied.
pub fn default_models(range: PitchRange, config: &ModelConfig) -> Models {
    Models::new(
        HistogramPitchModel::from_config(range, config),
        MeanRhythmModel::from_config(config),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fv(pitch: u8, step: f64, duration: f64) -> FeatureVector {
        FeatureVector {
            pitch: PitchRange::default().normalize(pitch),
            step,
            duration,
        }
    }

    #[test]
    fn histogram_is_a_distribution() {
        let model = HistogramPitchModel {
            range: PitchRange::default(),
            decay: 0.9,
            smoothing: 0.01,
        };
        let probs = model
            .predict_pitch(&[fv(60, 0.1, 0.1), fv(64, 0.1, 0.1)])
            .unwrap();
        assert_eq!(probs.len(), 88);
        assert_relative_eq!(probs.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        // The newest note outweighs the older one.
        assert!(probs[43] > probs[39]);
        assert!(probs[0] > 0.0);
    }

    #[test]
    fn histogram_without_smoothing_or_context_is_uniform() {
        let model = HistogramPitchModel {
            range: PitchRange::default(),
            decay: 1.0,
            smoothing: 0.0,
        };
        let probs = model.predict_pitch(&[]).unwrap();
        assert_relative_eq!(probs[0], 1.0 / 88.0, epsilon = 1e-12);
    }

    #[test]
    fn mean_rhythm_weights_recent_notes() {
        let model = MeanRhythmModel { decay: 0.5 };
        let pred = model
            .predict_rhythm(&[fv(60, 0.0, 0.0), fv(60, 0.3, 0.6)])
            .unwrap();
        // (1 * 0.3 + 0.5 * 0.0) / 1.5
        assert_relative_eq!(pred.step, 0.2, epsilon = 1e-12);
        assert_relative_eq!(pred.duration, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn mean_rhythm_rejects_empty_window() {
        assert!(MeanRhythmModel { decay: 0.5 }.predict_rhythm(&[]).is_err());
    }
}
