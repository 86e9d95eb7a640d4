//! @ai:module:intent Invoke the external CUDA compiler with the fixed flag template
//! @ai:module:layer infrastructure
//! @ai:module:public_api Toolchain, NvccToolchain, MockToolchain, ToolchainOutput, nvcc_command
//! @ai:module:stateless true

use crate::compile::target::GpuTarget;
use crate::config::CompilerConfig;
use crate::error::CompileError;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Suffix that turns on shared-library output.
pub const SHARED_LIBRARY_SUFFIX: &str = ".so";

const COMPILER_POLL: Duration = Duration::from_millis(10);

/// How long to wait for stderr after the compiler exits; its helpers may still hold the pipe.
const STDERR_DRAIN: Duration = Duration::from_secs(1);

/// @ai:intent Exit status and stderr of one compiler run
#[derive(Debug, Clone)]
pub struct ToolchainOutput {
    pub success: bool,
    pub stderr: String,
}

/// @ai:intent Trait for the external code generator
pub trait Toolchain: Send + Sync {
    /// @ai:intent Compile `sources` into `output` for `target`
    /// @ai:post returns `CompileError::TimedOut` if the build is still running after `timeout`
    /// @ai:effects fs:write, io
    fn compile(
        &self,
        target: GpuTarget,
        sources: &[&Path],
        output: &Path,
        timeout: Duration,
    ) -> Result<ToolchainOutput, CompileError>;
}

/// @ai:intent Run a compiler command, killing its whole process group at the deadline
/// @ai:post a failed run always carries non-empty stderr
/// @ai:effects process:spawn, io
pub fn run_compiler(
    command: &mut Command,
    program: &str,
    timeout: Duration,
) -> Result<ToolchainOutput, CompileError> {
    let toolchain_error = |e: std::io::Error| CompileError::Toolchain {
        program: program.to_string(),
        reason: e.to_string(),
    };

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(toolchain_error)?;

    let stderr = child.stderr.take();
    let (sender, captured) = crossbeam_channel::bounded(1);
    let reader = thread::Builder::new()
        .name("compiler-stderr".to_string())
        .spawn(move || {
            let mut bytes = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut bytes);
            }
            let _ = sender.send(String::from_utf8_lossy(&bytes).into_owned());
        });
    if let Err(e) = reader {
        kill_group(&mut child);
        return Err(toolchain_error(e));
    }

    let deadline = Instant::now().checked_add(timeout);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if deadline.is_some_and(|d| Instant::now() >= d) => {
                kill_group(&mut child);
                tracing::warn!(
                    "{} exceeded time limit of {:.2}s and was killed",
                    program,
                    timeout.as_secs_f64()
                );
                return Err(CompileError::TimedOut(timeout));
            }
            Ok(None) => thread::sleep(COMPILER_POLL),
            Err(e) => {
                kill_group(&mut child);
                return Err(toolchain_error(e));
            }
        }
    };

    let mut stderr = captured.recv_timeout(STDERR_DRAIN).unwrap_or_default();
    if !status.success() && stderr.trim().is_empty() {
        stderr = format!("{program} failed without diagnostics ({status})");
    }

    Ok(ToolchainOutput {
        success: status.success(),
        stderr,
    })
}

/// SIGKILL the compiler and every helper it spawned, then reap it.
fn kill_group(child: &mut Child) {
    if let Ok(pid) = i32::try_from(child.id()) {
        let _ = killpg(Pid::from_raw(pid), Signal::SIGKILL);
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// @ai:intent Build the nvcc argument vector (program first)
/// @ai:effects pure
pub fn nvcc_command(
    config: &CompilerConfig,
    target: GpuTarget,
    sources: &[&Path],
    output: &Path,
) -> Vec<String> {
    let sm = target.arch_code();
    let mut cmd = vec![
        config.program.clone(),
        format!("-std={}", config.standard),
        config.optimization.clone(),
        "-Xcompiler".to_string(),
        "-fPIC".to_string(),
        format!("-arch=compute_{sm}"),
        format!("-code=sm_{sm}"),
    ];

    cmd.extend(config.extra_flags.iter().cloned());

    if output.to_string_lossy().ends_with(SHARED_LIBRARY_SUFFIX) {
        cmd.push("-shared".to_string());
    }

    cmd.push("-o".to_string());
    cmd.push(output.to_string_lossy().into_owned());
    cmd.extend(sources.iter().map(|s| s.to_string_lossy().into_owned()));

    cmd
}

/// @ai:intent Runs nvcc as a deadline-bounded subprocess
pub struct NvccToolchain {
    config: CompilerConfig,
}

impl NvccToolchain {
    /// @ai:intent Create a toolchain from compiler configuration
    /// @ai:effects pure
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }
}

impl Default for NvccToolchain {
    fn default() -> Self {
        Self::new(CompilerConfig::default())
    }
}

impl Toolchain for NvccToolchain {
    /// @ai:intent Run nvcc; a non-zero exit is reported, not raised
    /// @ai:effects fs:write, io
    fn compile(
        &self,
        target: GpuTarget,
        sources: &[&Path],
        output: &Path,
        timeout: Duration,
    ) -> Result<ToolchainOutput, CompileError> {
        let cmd = nvcc_command(&self.config, target, sources, output);
        tracing::debug!("Running {}", cmd.join(" "));

        run_compiler(
            Command::new(&cmd[0]).args(&cmd[1..]),
            &self.config.program,
            timeout,
        )
    }
}

/// @ai:intent Scripted toolchain for tests and dry runs: counts invocations,
///            emits deterministic bytes, fails on sources containing `FAIL_MARKER`,
///            and times out when its delay exceeds the deadline
pub struct MockToolchain {
    invocations: AtomicUsize,
    delay: Duration,
    seen_outputs: Mutex<Vec<PathBuf>>,
}

impl MockToolchain {
    /// Sources containing this text fail to compile.
    pub const FAIL_MARKER: &'static str = "syntax error";

    /// @ai:intent Create a mock toolchain that answers immediately
    /// @ai:effects pure
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// @ai:intent Create a mock toolchain that sleeps before answering
    /// @ai:effects pure
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            invocations: AtomicUsize::new(0),
            delay,
            seen_outputs: Mutex::new(Vec::new()),
        }
    }

    /// @ai:intent Number of compiler runs so far
    /// @ai:effects pure
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    /// @ai:intent Output paths the toolchain was asked to write
    /// @ai:effects pure
    pub fn seen_outputs(&self) -> Vec<PathBuf> {
        self.seen_outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockToolchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Toolchain for MockToolchain {
    fn compile(
        &self,
        target: GpuTarget,
        sources: &[&Path],
        output: &Path,
        timeout: Duration,
    ) -> Result<ToolchainOutput, CompileError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.seen_outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(output.to_path_buf());

        if self.delay > timeout {
            thread::sleep(timeout);
            return Err(CompileError::TimedOut(timeout));
        }
        thread::sleep(self.delay);

        let mut code = String::new();
        for source in sources {
            code.push_str(&std::fs::read_to_string(source).map_err(|e| CompileError::Io(e.to_string()))?);
        }

        if code.contains(Self::FAIL_MARKER) {
            let file = sources.first().map(|s| s.display().to_string()).unwrap_or_default();
            return Ok(ToolchainOutput {
                success: false,
                stderr: format!("{file}(1): error: expected a declaration\n1 error detected in the compilation of \"{file}\".\n"),
            });
        }

        let bytes = format!("\x7fELF sm_{} {}", target.arch_code(), code);
        std::fs::write(output, bytes).map_err(|e| CompileError::Io(e.to_string()))?;

        Ok(ToolchainOutput {
            success: true,
            stderr: String::new(),
        })
    }
}
