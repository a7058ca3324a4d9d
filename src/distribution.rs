//! Inter-arrival distributions for sensor emissions.

use rand::Rng;
use rand_distr::{Distribution as _, Exp, Normal};
use serde::{Deserialize, Serialize};

use crate::types::SimTime;

/// Time between two consecutive emissions of a sensor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Distribution {
    /// Fixed interval.
    Deterministic { value: SimTime },
    /// Uniform between `min` and `max`.
    Uniform { min: SimTime, max: SimTime },
    /// Gaussian, clamped to be non-negative.
    Normal { mean: SimTime, std_dev: SimTime },
    /// Exponential with the given mean (Poisson arrivals).
    Exponential { mean: SimTime },
}

impl Distribution {
    /// A fixed interval.
    pub fn deterministic(value: SimTime) -> Self {
        Distribution::Deterministic { value }
    }

    /// Samples the next interval.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> SimTime {
        match *self {
            Distribution::Deterministic { value } => value,
            Distribution::Uniform { min, max } => {
                if min >= max {
                    min
                } else {
                    rng.gen_range(min..max)
                }
            }
            Distribution::Normal { mean, std_dev } => match Normal::new(mean, std_dev) {
                Ok(normal) => normal.sample(rng).max(0.0),
                Err(_) => mean.max(0.0),
            },
            Distribution::Exponential { mean } => match Exp::new(1.0 / mean) {
                Ok(exp) => exp.sample(rng),
                Err(_) => mean,
            },
        }
    }

    /// Expected interval.
    pub fn mean(&self) -> SimTime {
        match *self {
            Distribution::Deterministic { value } => value,
            Distribution::Uniform { min, max } => (min + max) / 2.0,
            Distribution::Normal { mean, .. } => mean,
            Distribution::Exponential { mean } => mean,
        }
    }

    /// Checks the parameters, returning a reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        let ok = match *self {
            Distribution::Deterministic { value } => value.is_finite() && value > 0.0,
            Distribution::Uniform { min, max } => min >= 0.0 && max.is_finite() && max > 0.0 && max >= min,
            Distribution::Normal { mean, std_dev } => {
                mean.is_finite() && mean > 0.0 && std_dev.is_finite() && std_dev >= 0.0
            }
            Distribution::Exponential { mean } => mean.is_finite() && mean > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("{:?} does not describe a positive interval", self))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_deterministic() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let dist = Distribution::deterministic(5.0);
        assert_eq!(dist.sample(&mut rng), 5.0);
        assert_eq!(dist.sample(&mut rng), 5.0);
        assert_eq!(dist.mean(), 5.0);
    }

    #[test]
    fn test_uniform_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let dist = Distribution::Uniform { min: 2.0, max: 4.0 };
        for _ in 0..1000 {
            let v = dist.sample(&mut rng);
            assert!((2.0..4.0).contains(&v), "sample {} out of range", v);
        }
    }

    #[test]
    fn test_normal_non_negative() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let dist = Distribution::Normal { mean: 1.0, std_dev: 5.0 };
        assert!((0..1000).all(|_| dist.sample(&mut rng) >= 0.0));
    }

    #[test]
    fn test_exponential_mean() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let dist = Distribution::Exponential { mean: 10.0 };
        let n = 20_000;
        let avg = (0..n).map(|_| dist.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((9.0..11.0).contains(&avg), "average {} too far from mean", avg);
    }

    #[test]
    fn test_validate() {
        assert!(Distribution::deterministic(0.0).validate().is_err());
        assert!(Distribution::Uniform { min: 3.0, max: 1.0 }.validate().is_err());
        assert!(Distribution::Exponential { mean: -1.0 }.validate().is_err());
        assert!(Distribution::deterministic(5.0).validate().is_ok());
    }
}
