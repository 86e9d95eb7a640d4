//! @ai:module:intent Stopping rules for the benchmark loop
//! @ai:module:layer domain
//! @ai:module:public_api BenchmarkPolicy, StoppingRule
//! @ai:module:stateless true

use crate::config::{seconds_or, BenchmarkConfig};
use std::time::Duration;

pub const DEFAULT_MIN_ITERATIONS: usize = 3;
pub const DEFAULT_MAX_RUNTIME: Duration = Duration::from_secs(1);
pub const DEFAULT_LONG_KERNEL_THRESHOLD: Duration = Duration::from_secs(1);

/// @ai:intent When to stop sampling once the minimum iteration count is met
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoppingRule {
    /// Keep sampling until the wall-clock budget is spent.
    Fixed,
    /// Stop once throughput samples settle below `target_cv`.
    Converged {
        target_cv: f64,
        max_iterations: usize,
        long_kernel_threshold: Duration,
    },
}

/// @ai:intent Iteration and time budget of one benchmark pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchmarkPolicy {
    pub min_iterations: usize,
    pub max_runtime: Duration,
    pub stopping: StoppingRule,
}

impl BenchmarkPolicy {
    /// @ai:intent Fixed policy: at least `min_iterations`, and at least `max_runtime` of wall time
    /// @ai:effects pure
    pub fn fixed(min_iterations: usize, max_runtime: Duration) -> Self {
        Self {
            min_iterations: min_iterations.max(1),
            max_runtime,
            stopping: StoppingRule::Fixed,
        }
    }

    /// @ai:intent Build the policy described by a `[benchmark]` config section
    /// @ai:effects pure
    pub fn from_config(config: &BenchmarkConfig) -> Self {
        let mut policy = Self::fixed(
            config.min_iterations,
            seconds_or(config.max_runtime_secs, DEFAULT_MAX_RUNTIME),
        );
        if config.stopping == "converged" {
            policy.stopping = StoppingRule::Converged {
                target_cv: config.target_cv,
                max_iterations: config.max_iterations.max(policy.min_iterations),
                long_kernel_threshold: seconds_or(config.long_kernel_threshold_secs, DEFAULT_LONG_KERNEL_THRESHOLD),
            };
        }
        policy
    }

    /// @ai:intent Decide whether another timed call is needed
    /// @ai:pre `samples` holds per-call device times in run order
    /// @ai:effects pure
    pub fn should_continue(&self, samples: &[Duration], elapsed: Duration) -> bool {
        if samples.len() < self.min_iterations {
            return true;
        }

        match self.stopping {
            StoppingRule::Fixed => elapsed < self.max_runtime,
            StoppingRule::Converged {
                target_cv,
                max_iterations,
                long_kernel_threshold,
            } => {
                let long_kernel = samples.first().is_some_and(|t| *t > long_kernel_threshold);
                if long_kernel || samples.len() >= max_iterations {
                    return false;
                }
                let rates = samples.iter().map(|t| 1.0 / t.as_secs_f64().max(f64::MIN_POSITIVE));
                coefficient_of_variation(rates) > target_cv
            }
        }
    }
}

impl Default for BenchmarkPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_MIN_ITERATIONS, DEFAULT_MAX_RUNTIME)
    }
}

/// @ai:intent Standard deviation over mean; 0 for fewer than two values
/// @ai:effects pure
pub fn coefficient_of_variation<I: Iterator<Item = f64> + Clone>(values: I) -> f64 {
    let (sum, count) = values.clone().fold((0.0, 0u32), |(s, c), v| (s + v, c + 1));
    if count < 2 || sum == 0.0 {
        return 0.0;
    }
    let mean = sum / count as f64;
    let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;

    variance.sqrt() / mean
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|v| Duration::from_millis(*v)).collect()
    }

    #[test]
    fn test_fixed_requires_minimum_iterations() {
        let policy = BenchmarkPolicy::default();

        assert!(policy.should_continue(&ms(&[2000, 2000]), Duration::from_secs(4)));
        assert!(!policy.should_continue(&ms(&[2000, 2000, 2000]), Duration::from_secs(6)));
    }

    #[test]
    fn test_fixed_spends_the_time_budget() {
        let policy = BenchmarkPolicy::default();
        let samples = ms(&[1; 50]);

        assert!(policy.should_continue(&samples, Duration::from_millis(999)));
        assert!(!policy.should_continue(&samples, Duration::from_secs(1)));
    }

    #[test]
    fn test_min_iterations_never_zero() {
        assert_eq!(BenchmarkPolicy::fixed(0, Duration::ZERO).min_iterations, 1);
    }

    #[test]
    fn test_converged_stops_on_steady_samples() {
        let policy = BenchmarkPolicy {
            stopping: StoppingRule::Converged {
                target_cv: 0.01,
                max_iterations: 100,
                long_kernel_threshold: Duration::from_secs(1),
            },
            ..BenchmarkPolicy::default()
        };

        assert!(!policy.should_continue(&ms(&[10, 10, 10]), Duration::ZERO));
        assert!(policy.should_continue(&ms(&[10, 20, 10]), Duration::ZERO));
        assert!(!policy.should_continue(&ms(&[10, 20, 10].repeat(34)), Duration::ZERO));
    }

    #[test]
    fn test_converged_long_kernel_stops_at_minimum() {
        let policy = BenchmarkPolicy {
            stopping: StoppingRule::Converged {
                target_cv: 0.0,
                max_iterations: 100,
                long_kernel_threshold: Duration::from_millis(500),
            },
            ..BenchmarkPolicy::default()
        };

        assert!(policy.should_continue(&ms(&[900, 100]), Duration::ZERO));
        assert!(!policy.should_continue(&ms(&[900, 100, 300]), Duration::ZERO));
    }

    #[test]
    fn test_from_config_tolerates_unrepresentable_seconds() {
        let config = BenchmarkConfig {
            max_runtime_secs: f64::INFINITY,
            long_kernel_threshold_secs: f64::NAN,
            stopping: "converged".to_string(),
            ..BenchmarkConfig::default()
        };

        let policy = BenchmarkPolicy::from_config(&config);

        assert_eq!(policy.max_runtime, DEFAULT_MAX_RUNTIME);
        assert!(matches!(
            policy.stopping,
            StoppingRule::Converged { long_kernel_threshold, .. } if long_kernel_threshold == DEFAULT_LONG_KERNEL_THRESHOLD
        ));
    }

    #[test]
    fn test_coefficient_of_variation() {
        assert_eq!(coefficient_of_variation([5.0, 5.0, 5.0].into_iter()), 0.0);
        assert_eq!(coefficient_of_variation([5.0].into_iter()), 0.0);

        let cv = coefficient_of_variation([2.0, 4.0, 6.0].into_iter());
        assert!((cv - 0.5).abs() < 1e-9);
    }
}
