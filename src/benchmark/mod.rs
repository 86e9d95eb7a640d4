//! @ai:module:intent Benchmark driver: device-timed iterations reduced to best-case GFLOPS
//! @ai:module:layer application
//! @ai:module:public_api BenchmarkDriver, BenchmarkResult, KernelCall, BenchmarkPolicy, StoppingRule

pub mod driver;
pub mod policy;

pub use driver::{BenchmarkDriver, BenchmarkResult, KernelCall};
pub use policy::{coefficient_of_variation, BenchmarkPolicy, StoppingRule};
