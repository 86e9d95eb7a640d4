//! @ai:module:intent End-to-end judging: compile once, then load and benchmark inside a sandboxed worker
//! @ai:module:layer application
//! @ai:module:public_api Judge, Submission, JudgeProgress, JudgeReport
//! @ai:module:stateless false

pub mod report;

pub use report::JudgeReport;

use crate::benchmark::{BenchmarkDriver, BenchmarkPolicy, BenchmarkResult};
use crate::compile::{ArtifactCache, Toolchain};
use crate::config::JudgeConfig;
use crate::device::{prepare_device, Device};
use crate::error::{CompileError, JudgeError};
use crate::native::{load, BoundCall, CallArgs};
use crate::problem::Problem;
use crate::sandbox::{self, EventSink, RunEvents, TerminalReason, WorkFailure};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

pub const STAGE_COMPILE: &str = "compile";
pub const STAGE_DEVICE: &str = "device";
pub const STAGE_LOAD: &str = "load";
pub const STAGE_ADAPTER: &str = "adapter";
pub const STAGE_BENCHMARK: &str = "benchmark";

/// @ai:intent Source text submitted for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub device: String,
    pub source: String,
    pub output_name: String,
}

impl Submission {
    pub fn new(device: &str, source: &str, output_name: &str) -> Self {
        Self {
            device: device.to_string(),
            source: source.to_string(),
            output_name: output_name.to_string(),
        }
    }
}

/// @ai:intent Progress payload streamed before each test case runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeProgress {
    pub test_id: usize,
    pub total: usize,
    pub name: String,
}

/// @ai:intent Orchestrates compile, load, and benchmark for submissions
///
/// The artifact cache lives in the calling process and may be shared between
/// judges; each submission's native code only ever runs in its own worker.
pub struct Judge {
    cache: Arc<ArtifactCache>,
    config: JudgeConfig,
}

impl Judge {
    /// @ai:intent Create a judge with its own cache in front of `toolchain`
    /// @ai:effects pure
    pub fn new(config: JudgeConfig, toolchain: Arc<dyn Toolchain>) -> Self {
        let capacity = NonZeroUsize::new(config.cache.capacity).unwrap_or(NonZeroUsize::MIN);
        Self::with_cache(config, Arc::new(ArtifactCache::new(toolchain, capacity)))
    }

    /// @ai:intent Create a judge that shares an existing cache
    /// @ai:effects pure
    pub fn with_cache(config: JudgeConfig, cache: Arc<ArtifactCache>) -> Self {
        Self { cache, config }
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// @ai:intent Judge a submission against every test case of `problem`
    /// @ai:pre `device` is exclusively owned by this run
    /// @ai:post the stream yields one Result per completed test case, then one Terminal
    /// @ai:effects fs, io, process:fork, device
    ///
    /// Unsupported devices fail immediately. Every other failure, including a
    /// failed compile, arrives as the stream's terminal event. The run timeout
    /// also bounds the compile.
    pub fn submit(
        &self,
        submission: &Submission,
        problem: Arc<dyn Problem>,
        device: Arc<dyn Device>,
    ) -> Result<RunEvents<JudgeProgress, BenchmarkResult>, JudgeError> {
        tracing::info!(
            "Judging {} on {} for problem {}",
            submission.output_name,
            submission.device,
            problem.name()
        );

        let timeout = self.config.timeout();
        let artifact = match self.cache.compile(
            &submission.device,
            &submission.source,
            &submission.output_name,
            timeout,
        ) {
            Ok(artifact) => artifact,
            Err(e @ CompileError::UnsupportedDevice(_)) => return Err(e.into()),
            Err(CompileError::TimedOut(limit)) => {
                tracing::warn!("Compilation of {} timed out", submission.output_name);
                return Ok(RunEvents::terminated(TerminalReason::timed_out(limit)));
            }
            Err(e) => {
                let message = match e.diagnostics() {
                    Some(diagnostics) => diagnostics.stderr.clone(),
                    None => e.to_string(),
                };
                tracing::warn!("Compilation of {} failed", submission.output_name);
                return Ok(RunEvents::terminated(TerminalReason::Failed {
                    stage: STAGE_COMPILE.to_string(),
                    message,
                }));
            }
        };

        let driver = BenchmarkDriver::new(BenchmarkPolicy::from_config(&self.config.benchmark));
        let settle = self.config.warmup_settle();

        let events = sandbox::run(
            move |sink| run_test_cases(sink, &artifact, problem.as_ref(), device.as_ref(), &driver, settle),
            timeout,
        )?;

        Ok(events)
    }
}

/// Worker body: prepare the device once, load the artifact, benchmark each test case.
fn run_test_cases(
    sink: &mut EventSink<JudgeProgress, BenchmarkResult>,
    artifact: &[u8],
    problem: &dyn Problem,
    device: &dyn Device,
    driver: &BenchmarkDriver,
    settle: Duration,
) -> Result<(), WorkFailure> {
    prepare_device(device, settle).map_err(|e| WorkFailure::new(STAGE_DEVICE, e))?;

    let module = load(artifact, problem.signature()).map_err(|e| WorkFailure::new(STAGE_LOAD, e))?;

    let test_cases = problem.test_cases();
    for (index, test_case) in test_cases.iter().enumerate() {
        let test_id = index + 1;
        sink.progress(JudgeProgress {
            test_id,
            total: test_cases.len(),
            name: test_case.name.clone(),
        })?;

        let buffers = problem
            .create_buffers(device, test_case)
            .map_err(|e| WorkFailure::new(STAGE_DEVICE, e))?;
        let extras = problem.extra_params(test_case);
        let args = CallArgs::prepare(module.signature(), &buffers.input_refs(), buffers.output.as_ref(), &extras)
            .map_err(|e| WorkFailure::new(STAGE_ADAPTER, e))?;

        // Safety: the problem's signature is the contract the submission compiles
        // against, and `buffers` outlives `call`.
        let mut call = unsafe { BoundCall::new(&module, args) };
        let result = driver
            .benchmark(device, &mut call, problem.flops(test_case), &test_case.name, test_id)
            .map_err(|e| WorkFailure::new(STAGE_BENCHMARK, e))?;

        sink.result(result)?;
    }

    Ok(())
}
