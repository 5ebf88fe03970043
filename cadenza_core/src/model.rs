// Inference seam between the generation loop and the predictive models.
//
// The generator never sees a concrete network. It holds a `Models` pair of
// trait objects and calls exactly two contracts on the same window slice:
// - `PitchModel::predict_pitch`: window -> one probability per pitch class
//   (88 for the piano range) for the position after the window.
// - `RhythmModel::predict_rhythm`: window -> (duration, step) for that
//   position, already in normalised feature space.
//
// Implementations report failure as a `String`; the generator turns that into
// `Error::Model` and aborts the run. Shape validation also happens in the
// generator, so a model that returns 87 classes or a NaN step fails loudly
// rather than being patched up.
//
// `Models` is built once at startup and shared read-only between requests
// (cloning only bumps two `Arc`s). Both traits require `Send + Sync`; an
// inference runtime that cannot be called concurrently goes inside `Locked`,
// which serialises calls with one mutex per model.
//
// See also: `baseline.rs` for the built-in context-statistics models.

use crate::features::FeatureVector;
use parking_lot::Mutex;
use std::sync::Arc;

/// Regression output of the rhythm model, in normalised feature space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RhythmPrediction {
    pub duration: f64,
    pub step: f64,
}

/// Categorical pitch model.
pub trait PitchModel: Send + Sync {
    fn predict_pitch(&self, window: &[FeatureVector]) -> Result<Vec<f64>, String>;
}

/// Duration and inter-onset step regression model.
pub trait RhythmModel: Send + Sync {
    fn predict_rhythm(&self, window: &[FeatureVector]) -> Result<RhythmPrediction, String>;
}

/// The two long-lived model handles every generation run uses.
#[derive(Clone)]
pub struct Models {
    pub pitch: Arc<dyn PitchModel>,
    pub rhythm: Arc<dyn RhythmModel>,
}

impl Models {
    pub fn new(pitch: impl PitchModel + 'static, rhythm: impl RhythmModel + 'static) -> Self {
        Models {
            pitch: Arc::new(pitch),
            rhythm: Arc::new(rhythm),
        }
    }
}

impl std::fmt::Debug for Models {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Models").finish_non_exhaustive()
    }
}

/// Adapter for models that cannot be shared between threads directly.
pub struct Locked<M> {
    inner: Mutex<M>,
}

impl<M> Locked<M> {
    pub fn new(model: M) -> Self {
        Locked {
            inner: Mutex::new(model),
        }
    }
}

/// Single-threaded pitch inference (e.g. a runtime session that needs `&mut`).
pub trait PitchModelMut: Send {
    fn predict_pitch_mut(&mut self, window: &[FeatureVector]) -> Result<Vec<f64>, String>;
}

/// Single-threaded rhythm inference.
pub trait RhythmModelMut: Send {
    fn predict_rhythm_mut(&mut self, window: &[FeatureVector]) -> Result<RhythmPrediction, String>;
}

impl<M: PitchModelMut> PitchModel for Locked<M> {
    fn predict_pitch(&self, window: &[FeatureVector]) -> Result<Vec<f64>, String> {
        self.inner.lock().predict_pitch_mut(window)
    }
}

impl<M: RhythmModelMut> RhythmModel for Locked<M> {
    fn predict_rhythm(&self, window: &[FeatureVector]) -> Result<RhythmPrediction, String> {
        self.inner.lock().predict_rhythm_mut(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts calls through `&mut self`, which is what `Locked` exists for.
    struct CountingModel {
        calls: usize,
    }

    impl PitchModelMut for CountingModel {
        fn predict_pitch_mut(&mut self, _window: &[FeatureVector]) -> Result<Vec<f64>, String> {
            self.calls += 1;
            Ok(vec![self.calls as f64])
        }
    }

    impl RhythmModelMut for CountingModel {
        fn predict_rhythm_mut(
            &mut self,
            window: &[FeatureVector],
        ) -> Result<RhythmPrediction, String> {
            self.calls += 1;
            Ok(RhythmPrediction {
                duration: window.len() as f64,
                step: self.calls as f64,
            })
        }
    }

    #[test]
    fn locked_model_serialises_mutable_calls() {
        let model = Locked::new(CountingModel { calls: 0 });
        assert_eq!(model.predict_pitch(&[]).unwrap(), vec![1.0]);
        assert_eq!(model.predict_pitch(&[]).unwrap(), vec![2.0]);
    }

    #[test]
    fn locked_models_are_shareable_across_threads() {
        let models = Models::new(
            Locked::new(CountingModel { calls: 0 }),
            Locked::new(CountingModel { calls: 0 }),
        );
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let models = models.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        models.rhythm.predict_rhythm(&[]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let last = models.rhythm.predict_rhythm(&[]).unwrap();
        assert_eq!(last.step, 101.0);
        assert_eq!(last.duration, 0.0);
    }
}
