// Temperature-controlled categorical sampling over pitch classes.
//
// scaled_i = exp(ln(p_i + EPSILON) / T), renormalised to sum to one.
//
// T -> 0 sharpens toward the most likely class, T = 1 keeps the model's own
// distribution (up to EPSILON), T -> inf flattens toward uniform. EPSILON
// keeps ln() finite for zero-probability classes, and it is added before the
// log, never after, so zero classes still get a (tiny) share at high T.
//
// The largest scaled log-probability is subtracted before exp(). After
// renormalisation the result is identical, but at small T every raw term
// would otherwise underflow to 0.0 and the division would produce NaN.

use crate::error::{Error, Result};
use cadenza_prng::SampleRng;

/// Added to each probability before taking its log.
pub const EPSILON: f64 = 1e-8;

/// Check that a model distribution has the expected shape and is usable.
pub fn check_distribution(probs: &[f64], classes: usize) -> Result<()> {
    if probs.len() != classes {
        return Err(Error::Model(format!(
            "pitch model returned {} probabilities, expected {}",
            probs.len(),
            classes
        )));
    }
    if let Some((i, p)) = probs
        .iter()
        .enumerate()
        .find(|(_, p)| !p.is_finite() || **p < 0.0)
    {
        return Err(Error::Model(format!(
            "pitch model returned invalid probability {p} for class {i}"
        )));
    }
    if probs.iter().sum::<f64>() <= 0.0 {
        return Err(Error::Model(
            "pitch model returned an all-zero distribution".into(),
        ));
    }
    Ok(())
}

/// Apply temperature scaling and renormalise.
pub fn apply_temperature(probs: &[f64], temperature: f64) -> Result<Vec<f64>> {
    if !temperature.is_finite() || temperature <= 0.0 {
        return Err(Error::InvalidConfig(format!(
            "temperature must be finite and positive, got {temperature}"
        )));
    }

    let logits: Vec<f64> = probs
        .iter()
        .map(|p| (p + EPSILON).ln() / temperature)
        .collect();
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut scaled: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = scaled.iter().sum();
    for s in &mut scaled {
        *s /= total;
    }
    Ok(scaled)
}

/// Draw one class index from `probs` after temperature scaling.
pub fn sample_class(probs: &[f64], temperature: f64, rng: &mut SampleRng) -> Result<usize> {
    let scaled = apply_temperature(probs, temperature)?;
    rng.weighted_index(&scaled)
        .ok_or_else(|| Error::Model("temperature-scaled distribution is empty".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn peaked(classes: usize, peak: usize) -> Vec<f64> {
        let rest = 0.5 / (classes - 1) as f64;
        (0..classes)
            .map(|i| if i == peak { 0.5 } else { rest })
            .collect()
    }

    #[test]
    fn scaled_distribution_sums_to_one() {
        let probs = peaked(88, 10);
        for t in [0.01, 0.5, 1.0, 4.0] {
            let scaled = apply_temperature(&probs, t).unwrap();
            assert_relative_eq!(scaled.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn unit_temperature_preserves_distribution() {
        let probs = vec![0.1, 0.2, 0.3, 0.4];
        let scaled = apply_temperature(&probs, 1.0).unwrap();
        for (a, b) in probs.iter().zip(&scaled) {
            assert_relative_eq!(a, b, epsilon = 1e-7);
        }
    }

    #[test]
    fn tiny_temperature_does_not_underflow() {
        let probs = peaked(88, 42);
        let scaled = apply_temperature(&probs, 1e-6).unwrap();
        assert!(scaled.iter().all(|p| p.is_finite()));
        assert_relative_eq!(scaled[42], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn low_temperature_converges_to_argmax() {
        let mut probs = peaked(88, 0);
        // Make class 17 the mode, only slightly ahead of the rest.
        probs[0] = 0.02;
        probs[17] = 0.06;
        let mut rng = SampleRng::new(3);
        for _ in 0..2_000 {
            assert_eq!(sample_class(&probs, 0.01, &mut rng).unwrap(), 17);
        }
    }

    #[test]
    fn high_temperature_approaches_uniform() {
        let probs = peaked(88, 5);
        let mut rng = SampleRng::new(11);
        let draws = 88_000;
        let mut counts = vec![0usize; 88];
        for _ in 0..draws {
            counts[sample_class(&probs, 1e6, &mut rng).unwrap()] += 1;
        }
        // Expected 1000 per class; allow generous statistical slack.
        for (class, &c) in counts.iter().enumerate() {
            assert!(
                (800..1200).contains(&c),
                "class {class} drawn {c} times, expected ~1000"
            );
        }
    }

    #[test]
    fn zero_probability_classes_gain_mass_at_high_temperature() {
        let probs = vec![1.0, 0.0];
        let scaled = apply_temperature(&probs, 1e9).unwrap();
        assert!(scaled[1] > 0.49);
    }

    #[test]
    fn rejects_bad_temperature() {
        let probs = vec![0.5, 0.5];
        assert!(matches!(
            apply_temperature(&probs, 0.0),
            Err(Error::InvalidConfig(_))
        ));
        assert!(apply_temperature(&probs, -1.0).is_err());
        assert!(apply_temperature(&probs, f64::NAN).is_err());
    }

    #[test]
    fn distribution_shape_checks() {
        assert!(check_distribution(&[0.5, 0.5], 2).is_ok());
        assert!(matches!(
            check_distribution(&[0.5, 0.5], 88),
            Err(Error::Model(_))
        ));
        assert!(check_distribution(&[0.5, -0.1], 2).is_err());
        assert!(check_distribution(&[0.5, f64::NAN], 2).is_err());
        assert!(check_distribution(&[0.0, 0.0], 2).is_err());
    }
}
