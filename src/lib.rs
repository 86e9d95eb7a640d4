//! @ai:module:intent Kernel judge library: cached compilation, sandboxed execution, benchmarking
//! @ai:module:layer application
//! @ai:module:public_api compile, native, sandbox, benchmark, judge, device, problem, config, toolchain

pub mod benchmark;
pub mod compile;
pub mod config;
pub mod device;
pub mod error;
pub mod judge;
pub mod native;
pub mod problem;
pub mod sandbox;
pub mod toolchain;

#[cfg(test)]
pub(crate) mod test_support;

pub use benchmark::{BenchmarkDriver, BenchmarkPolicy, BenchmarkResult};
pub use compile::{ArtifactCache, GpuTarget, NvccToolchain, Toolchain};
pub use config::JudgeConfig;
pub use device::{Device, HostDevice};
pub use error::JudgeError;
pub use judge::{Judge, JudgeReport, Submission};
pub use native::{load, LoadedModule};
pub use problem::{Problem, TestCase};
pub use sandbox::{run, RunEvent, RunEvents, TerminalReason};
pub use toolchain::{ToolchainStatus, ToolchainValidator};
