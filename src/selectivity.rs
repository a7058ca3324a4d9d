//! Selectivity rules: how often one consumed tuple yields one output tuple.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::SimTime;

/// Decides, per consumed input tuple, whether the mapped output is emitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Selectivity {
    /// Independent trial with success probability `fraction`.
    ///
    /// `1.0` always emits and `0.0` never does; neither consumes randomness.
    Fractional { fraction: f64 },

    /// Emits only inside periodic high-burst windows.
    ///
    /// Starting at `first_high_time`, the rule alternates `burst_high` time
    /// units of emitting with `burst_low` time units of silence. Nothing is
    /// emitted before `first_high_time`.
    Bursty {
        burst_low: SimTime,
        burst_high: SimTime,
        first_high_time: SimTime,
    },
}

impl Selectivity {
    /// Fractional selectivity.
    pub fn fractional(fraction: f64) -> Self {
        Selectivity::Fractional { fraction }
    }

    /// One output per input, always.
    pub fn deterministic() -> Self {
        Selectivity::Fractional { fraction: 1.0 }
    }

    /// Checks the parameters, returning a reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Selectivity::Fractional { fraction } => {
                if !(0.0..=1.0).contains(&fraction) {
                    return Err(format!("fraction {} is outside [0, 1]", fraction));
                }
            }
            Selectivity::Bursty {
                burst_low,
                burst_high,
                first_high_time,
            } => {
                if !(burst_low >= 0.0 && burst_high > 0.0) {
                    return Err("burst_high must be positive and burst_low non-negative".into());
                }
                if !first_high_time.is_finite() {
                    return Err("first_high_time must be finite".into());
                }
            }
        }
        Ok(())
    }

    /// Runs one trial at simulated time `now`.
    pub fn can_select<R: Rng + ?Sized>(&self, now: SimTime, rng: &mut R) -> bool {
        match *self {
            Selectivity::Fractional { fraction } => {
                if fraction >= 1.0 {
                    true
                } else if fraction <= 0.0 {
                    false
                } else {
                    rng.gen::<f64>() < fraction
                }
            }
            Selectivity::Bursty {
                burst_low,
                burst_high,
                first_high_time,
            } => {
                if now < first_high_time {
                    return false;
                }
                let period = burst_high + burst_low;
                (now - first_high_time) % period < burst_high
            }
        }
    }

    /// Long-run fraction of inputs that produce an output.
    pub fn mean_rate(&self) -> f64 {
        match *self {
            Selectivity::Fractional { fraction } => fraction,
            Selectivity::Bursty {
                burst_low,
                burst_high,
                ..
            } => burst_high / (burst_high + burst_low),
        }
    }
}

impl Default for Selectivity {
    fn default() -> Self {
        Self::deterministic()
    }
}
