//! @ai:module:intent Turn submitted source text into cached native artifacts
//! @ai:module:layer application
//! @ai:module:public_api ArtifactCache, GpuTarget, Toolchain, NvccToolchain, CompileDiagnostics

pub mod cache;
pub mod diagnostics;
pub mod target;
pub mod toolchain;

pub use cache::{ArtifactCache, CachedArtifact, CompileKey, DEFAULT_CAPACITY};
pub use diagnostics::{CompileDiagnostics, Diagnostic, Severity};
pub use target::{GpuTarget, SUPPORTED_DEVICES};
pub use toolchain::{nvcc_command, run_compiler, MockToolchain, NvccToolchain, Toolchain, ToolchainOutput};
