//! @ai:module:intent Configuration structs for the judge
//! @ai:module:layer infrastructure
//! @ai:module:public_api JudgeConfig, CompilerConfig, CacheConfig, RunnerConfig, BenchmarkConfig, DeviceConfig
//! @ai:module:stateless true

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// @ai:intent Seconds from config as a Duration; values a Duration cannot hold give `default`
/// @ai:effects pure
pub fn seconds_or(secs: f64, default: Duration) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(default)
}

/// @ai:intent Main configuration for the judge
/// @ai:effects pure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

/// @ai:intent External compiler invocation settings
/// @ai:effects pure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_standard")]
    pub standard: String,
    #[serde(default = "default_optimization")]
    pub optimization: String,
    #[serde(default)]
    pub extra_flags: Vec<String>,
}

/// @ai:intent Artifact cache bound
/// @ai:effects pure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached artifacts (successes and failures)
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// @ai:intent Sandboxed runner settings
/// @ai:effects pure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Deadline for each event receive, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
}

/// @ai:intent Benchmark loop settings
/// @ai:effects pure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    #[serde(default = "default_min_iterations")]
    pub min_iterations: usize,
    #[serde(default = "default_max_runtime_secs")]
    pub max_runtime_secs: f64,
    /// "fixed" or "converged"
    #[serde(default = "default_stopping")]
    pub stopping: String,
    #[serde(default = "default_target_cv")]
    pub target_cv: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_long_kernel_threshold_secs")]
    pub long_kernel_threshold_secs: f64,
}

/// @ai:intent Device preparation settings
/// @ai:effects pure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_warmup_settle_ms")]
    pub warmup_settle_ms: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            standard: default_standard(),
            optimization: default_optimization(),
            extra_flags: Vec::new(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            min_iterations: default_min_iterations(),
            max_runtime_secs: default_max_runtime_secs(),
            stopping: default_stopping(),
            target_cv: default_target_cv(),
            max_iterations: default_max_iterations(),
            long_kernel_threshold_secs: default_long_kernel_threshold_secs(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            warmup_settle_ms: default_warmup_settle_ms(),
        }
    }
}

fn default_program() -> String {
    "nvcc".to_string()
}

fn default_standard() -> String {
    "c++20".to_string()
}

fn default_optimization() -> String {
    "-O2".to_string()
}

// ~1 MB per artifact
fn default_capacity() -> usize {
    512
}

fn default_timeout_secs() -> f64 {
    DEFAULT_TIMEOUT.as_secs_f64()
}

fn default_min_iterations() -> usize {
    3
}

fn default_max_runtime_secs() -> f64 {
    1.0
}

fn default_stopping() -> String {
    "fixed".to_string()
}

fn default_target_cv() -> f64 {
    0.01
}

fn default_max_iterations() -> usize {
    100
}

fn default_long_kernel_threshold_secs() -> f64 {
    1.0
}

fn default_warmup_settle_ms() -> u64 {
    500
}

impl JudgeConfig {
    /// @ai:intent Load configuration from a TOML file
    /// @ai:pre path exists and is readable
    /// @ai:effects fs:read
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// @ai:intent Reject durations that are negative, NaN, infinite, or too large to represent
    /// @ai:effects pure
    pub fn validate(&self) -> anyhow::Result<()> {
        let durations = [
            ("runner.timeout_secs", self.runner.timeout_secs),
            ("benchmark.max_runtime_secs", self.benchmark.max_runtime_secs),
            ("benchmark.long_kernel_threshold_secs", self.benchmark.long_kernel_threshold_secs),
        ];
        for (field, secs) in durations {
            if Duration::try_from_secs_f64(secs).is_err() {
                bail!("{field} must be a finite, non-negative number of seconds, got {secs}");
            }
        }
        if !self.benchmark.target_cv.is_finite() || self.benchmark.target_cv < 0.0 {
            bail!(
                "benchmark.target_cv must be a finite, non-negative number, got {}",
                self.benchmark.target_cv
            );
        }
        Ok(())
    }

    /// @ai:intent Save configuration to a TOML file
    /// @ai:effects fs:write
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// @ai:intent Per-receive deadline of a sandboxed run
    /// @ai:effects pure
    pub fn timeout(&self) -> Duration {
        seconds_or(self.runner.timeout_secs, DEFAULT_TIMEOUT)
    }

    /// @ai:intent Settle delay after device warm-up
    /// @ai:effects pure
    pub fn warmup_settle(&self) -> Duration {
        Duration::from_millis(self.device.warmup_settle_ms)
    }
}
