//! @ai:module:intent Time repeated kernel calls with device timers and reduce to best-case throughput
//! @ai:module:layer application
//! @ai:module:public_api BenchmarkDriver, BenchmarkResult, KernelCall
//! @ai:module:stateless true

use crate::benchmark::policy::BenchmarkPolicy;
use crate::device::Device;
use crate::error::DeviceError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Smallest per-call time used in the throughput division.
const TIMER_FLOOR: Duration = Duration::from_nanos(1);

/// @ai:intent Something the driver can invoke once per timed iteration
pub trait KernelCall {
    fn call(&mut self);
}

impl<F: FnMut()> KernelCall for F {
    fn call(&mut self) {
        self()
    }
}

/// @ai:intent Benchmark outcome of one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub name: String,
    pub test_id: usize,
    pub gflops: f64,
    pub sample_count: usize,
    pub best_runtime_secs: f64,
}

/// @ai:intent Runs the timed loop under a stopping policy
pub struct BenchmarkDriver {
    policy: BenchmarkPolicy,
}

impl BenchmarkDriver {
    /// @ai:intent Create a driver with the given policy
    /// @ai:effects pure
    pub fn new(policy: BenchmarkPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &BenchmarkPolicy {
        &self.policy
    }

    /// @ai:intent Time `call` until the policy is satisfied; report the fastest call
    /// @ai:pre the device was prepared for this run
    /// @ai:post sample_count >= policy.min_iterations
    /// @ai:effects device, time
    pub fn benchmark(
        &self,
        device: &dyn Device,
        call: &mut dyn KernelCall,
        flops: f64,
        name: &str,
        test_id: usize,
    ) -> Result<BenchmarkResult, DeviceError> {
        let mut timer = device.timer()?;
        let mut samples: Vec<Duration> = Vec::new();
        let started = Instant::now();

        while self.policy.should_continue(&samples, started.elapsed()) {
            timer.start()?;
            call.call();
            timer.stop()?;
            device.synchronize()?;
            samples.push(timer.elapsed()?);
        }

        let best = samples.iter().min().copied().unwrap_or_default().max(TIMER_FLOOR);
        let best_runtime_secs = best.as_secs_f64();
        let gflops = flops / best_runtime_secs / 1e9;

        tracing::info!(
            "Benchmarked {} (test {}): {:.2} GFLOPS, best {:.6}s over {} samples",
            name,
            test_id,
            gflops,
            best_runtime_secs,
            samples.len()
        );

        Ok(BenchmarkResult {
            name: name.to_string(),
            test_id,
            gflops,
            sample_count: samples.len(),
            best_runtime_secs,
        })
    }
}

impl Default for BenchmarkDriver {
    fn default() -> Self {
        Self::new(BenchmarkPolicy::default())
    }
}
