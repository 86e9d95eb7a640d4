//! Host C compiler helpers for tests that need real shared libraries.

use crate::compile::{run_compiler, GpuTarget, Toolchain, ToolchainOutput};
use crate::error::CompileError;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

const HOST_CC: &str = "cc";

pub fn host_cc_available() -> bool {
    Command::new(HOST_CC)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn host_cc(sources: &[&Path], output: &Path) -> Command {
    let mut command = Command::new(HOST_CC);
    command
        .args(["-shared", "-fPIC", "-O1", "-x", "c", "-o"])
        .arg(output)
        .args(sources);
    command
}

/// Compile C source into shared library bytes.
pub fn build_host_library(c_source: &str) -> Vec<u8> {
    let dir = tempfile::TempDir::new().unwrap();
    let source = dir.path().join("lib.c");
    let output = dir.path().join("libtest.so");
    std::fs::write(&source, c_source).unwrap();

    let result = host_cc(&[source.as_path()], &output).output().unwrap();
    assert!(
        result.status.success(),
        "host compile failed: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    std::fs::read(&output).unwrap()
}

/// Builds submissions as host C, ignoring the GPU target.
pub struct HostCcToolchain;

impl Toolchain for HostCcToolchain {
    fn compile(
        &self,
        _target: GpuTarget,
        sources: &[&Path],
        output: &Path,
        timeout: Duration,
    ) -> Result<ToolchainOutput, CompileError> {
        run_compiler(&mut host_cc(sources, output), HOST_CC, timeout)
    }
}
