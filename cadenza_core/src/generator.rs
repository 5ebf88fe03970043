// Autoregressive sequence generator.
//
// Starting from the encoded seed, each iteration:
// 1. takes the trailing `window` feature vectors as context,
// 2. asks the pitch model for a distribution over the pitch classes,
// 3. samples a class after temperature scaling (sampling.rs),
// 4. maps the class back to a MIDI pitch and re-normalises it, so the new
//    vector sits on the same scale as the encoded seed,
// 5. asks the rhythm model for (duration, step) on the same slice,
// 6. clamps both predictions to the configured bounds,
// 7. appends the new vector, which becomes context for the next iteration.
//
// The sequence grows by exactly one vector per iteration and nothing else
// mutates it. The only source of randomness is the `SampleRng` passed in, so
// a run is reproducible from (seed notes, models, config, rng seed).
//
// Any model failure or malformed output aborts the whole run. There is no
// fallback note. An empty seed is rejected before the first inference call.
//
// Long runs can be stopped between iterations through `CancelToken`, either
// explicitly or by a deadline.

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::features::{FeatureMatrix, FeatureVector};
use crate::model::Models;
use crate::sampling::{check_distribution, sample_class};
use cadenza_prng::SampleRng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Cooperative cancellation for a generation run.
///
/// Clones share the same flag, so one clone can be handed to whoever may
/// need to stop the run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail if the run should stop now.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded);
            }
        }
        Ok(())
    }
}

/// Extend `seed` by `config.steps` predicted feature vectors.
///
/// Returns a matrix of length `seed.len() + config.steps` whose prefix is the
/// unchanged seed.
pub fn generate(
    seed: &[FeatureVector],
    models: &Models,
    config: &GenerationConfig,
    rng: &mut SampleRng,
    cancel: &CancelToken,
) -> Result<FeatureMatrix> {
    config.validate()?;
    if seed.is_empty() {
        return Err(Error::EmptySeed);
    }

    let range = config.pitch_range;
    let mut sequence: FeatureMatrix = Vec::with_capacity(seed.len() + config.steps);
    sequence.extend_from_slice(seed);

    for step_index in 0..config.steps {
        cancel.check()?;

        let context_start = sequence.len().saturating_sub(config.window);
        let window = &sequence[context_start..];

        let probs = models
            .pitch
            .predict_pitch(window)
            .map_err(|e| Error::Model(format!("pitch model failed at step {step_index}: {e}")))?;
        check_distribution(&probs, range.classes())?;
        let class = sample_class(&probs, config.temperature, rng)?;
        let pitch = range
            .class_to_pitch(class)
            .ok_or_else(|| Error::Model(format!("sampled class {class} outside pitch range")))?;

        let rhythm = models
            .rhythm
            .predict_rhythm(window)
            .map_err(|e| Error::Model(format!("rhythm model failed at step {step_index}: {e}")))?;
        if !rhythm.duration.is_finite() || !rhythm.step.is_finite() {
            return Err(Error::Model(format!(
                "rhythm model returned non-finite output at step {step_index}: \
                 duration={}, step={}",
                rhythm.duration, rhythm.step
            )));
        }

        sequence.push(FeatureVector {
            pitch: range.normalize(pitch),
            step: config.step_clamp.apply(rhythm.step),
            duration: config.duration_clamp.apply(rhythm.duration),
        });
    }

    debug!(
        "Generated {} notes from a seed of {} (window {}, temperature {})",
        config.steps,
        seed.len(),
        config.window,
        config.temperature
    );
    Ok(sequence)
}
