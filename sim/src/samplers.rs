//! Random process samplers.
//!
//! Tagged sampler configurations for phase durations and inter-arrival
//! gaps. Each variant exposes a uniform draw, so the arrival process and
//! the lifecycle are agnostic to which distribution is active. Draws are
//! clamped non-negative; an invalid draw is a local condition, never a
//! request outcome.

use crate::ConfigError;
use rand::Rng;
use rand_distr::{Distribution, LogNormal};
use serde::{Deserialize, Serialize};

/// Phase-duration distribution (CPU or I/O), mean in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "dist")]
pub enum ServiceDist {
    Exponential { mean_ms: f64 },
    LogNormal { mean_ms: f64, sigma: f64 },
}

impl ServiceDist {
    pub fn mean_ms(&self) -> f64 {
        match *self {
            ServiceDist::Exponential { mean_ms } => mean_ms,
            ServiceDist::LogNormal { mean_ms, .. } => mean_ms,
        }
    }

    /// Build the drawable sampler; parameters are validated here so the
    /// hot path never fails.
    pub fn sampler(&self) -> Result<ServiceSampler, ConfigError> {
        match *self {
            ServiceDist::Exponential { mean_ms } => Ok(ServiceSampler::Exponential { mean_ms }),
            ServiceDist::LogNormal { mean_ms, sigma } => {
                // Arithmetic mean of LogNormal is exp(mu + sigma^2/2);
                // solve for mu so the configured mean holds.
                let mu = mean_ms.ln() - 0.5 * sigma * sigma;
                let dist = LogNormal::new(mu, sigma)
                    .map_err(|_| ConfigError::InvalidSigma { value: sigma })?;
                Ok(ServiceSampler::LogNormal(dist))
            }
        }
    }
}

/// Drawable counterpart of [`ServiceDist`].
#[derive(Debug, Clone, Copy)]
pub enum ServiceSampler {
    Exponential { mean_ms: f64 },
    LogNormal(LogNormal<f64>),
}

impl ServiceSampler {
    pub fn draw<R: Rng>(&self, rng: &mut R) -> f64 {
        let value = match self {
            ServiceSampler::Exponential { mean_ms } => exponential_ms(rng, *mean_ms),
            ServiceSampler::LogNormal(dist) => dist.sample(rng),
        };
        value.max(0.0)
    }
}

/// Inter-arrival pattern; the mean rate is configured separately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "pattern")]
pub enum ArrivalPattern {
    /// Exponential inter-arrival gaps
    Poisson,
    /// With probability `burst_prob` the instantaneous rate is multiplied
    /// by `burst_factor`, grouping arrivals with near-zero spacing.
    Bursty { burst_factor: f64, burst_prob: f64 },
}

impl ArrivalPattern {
    /// Draw the next inter-arrival gap in milliseconds for `rate_rps`
    /// mean arrivals per second.
    pub fn next_gap_ms<R: Rng>(&self, rate_rps: f64, rng: &mut R) -> f64 {
        let rate = match *self {
            ArrivalPattern::Poisson => rate_rps,
            ArrivalPattern::Bursty {
                burst_factor,
                burst_prob,
            } => {
                if rng.gen::<f64>() < burst_prob {
                    rate_rps * burst_factor
                } else {
                    rate_rps
                }
            }
        };
        exponential_ms(rng, 1000.0 / rate)
    }
}

/// Inverse-CDF exponential draw with the given mean.
fn exponential_ms<R: Rng>(rng: &mut R, mean_ms: f64) -> f64 {
    let u: f64 = rng.gen();
    -(1.0 - u).ln() * mean_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn mean_of(mut draw: impl FnMut() -> f64, n: usize) -> f64 {
        (0..n).map(|_| draw()).sum::<f64>() / n as f64
    }

    #[test]
    fn test_exponential_mean() {
        let mut rng = SmallRng::seed_from_u64(7);
        let sampler = ServiceDist::Exponential { mean_ms: 20.0 }.sampler().unwrap();
        let mean = mean_of(|| sampler.draw(&mut rng), 100_000);
        assert!((mean - 20.0).abs() < 0.5, "mean = {mean}");
    }

    #[test]
    fn test_lognormal_mean_correction() {
        let mut rng = SmallRng::seed_from_u64(7);
        let sampler = ServiceDist::LogNormal {
            mean_ms: 50.0,
            sigma: 1.0,
        }
        .sampler()
        .unwrap();
        let mean = mean_of(|| sampler.draw(&mut rng), 200_000);
        // Heavier tail, looser tolerance
        assert!((mean - 50.0).abs() < 2.5, "mean = {mean}");
    }

    #[test]
    fn test_lognormal_rejects_bad_sigma() {
        let dist = ServiceDist::LogNormal {
            mean_ms: 50.0,
            sigma: -1.0,
        };
        assert!(dist.sampler().is_err());
    }

    #[test]
    fn test_draws_are_non_negative() {
        let mut rng = SmallRng::seed_from_u64(3);
        let sampler = ServiceDist::Exponential { mean_ms: 1.0 }.sampler().unwrap();
        for _ in 0..10_000 {
            assert!(sampler.draw(&mut rng) >= 0.0);
        }
    }

    #[test]
    fn test_poisson_gap_mean_matches_rate() {
        let mut rng = SmallRng::seed_from_u64(11);
        let pattern = ArrivalPattern::Poisson;
        let mean = mean_of(|| pattern.next_gap_ms(100.0, &mut rng), 100_000);
        // 100 req/s => 10 ms mean gap
        assert!((mean - 10.0).abs() < 0.3, "mean gap = {mean}");
    }

    #[test]
    fn test_bursty_gaps_shorter_on_average() {
        let mut rng = SmallRng::seed_from_u64(11);
        let bursty = ArrivalPattern::Bursty {
            burst_factor: 5.0,
            burst_prob: 0.5,
        };
        let mean = mean_of(|| bursty.next_gap_ms(100.0, &mut rng), 100_000);
        assert!(mean < 10.0, "mean gap = {mean}");
    }
}
