//! @ai:module:intent Validate the host tools the judge depends on
//! @ai:module:layer infrastructure
//! @ai:module:public_api ToolchainValidator, ToolchainStatus, HostTool, nvidia_smi_report
//! @ai:module:stateless true

use crate::config::CompilerConfig;
use std::process::Command;

/// @ai:intent One external tool and how to probe it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTool {
    pub name: String,
    pub purpose: &'static str,
    pub probe_args: &'static [&'static str],
}

/// @ai:intent Status of toolchain validation
#[derive(Debug, Default)]
pub struct ToolchainStatus {
    pub available: Vec<HostTool>,
    pub missing_tools: Vec<MissingTool>,
}

impl ToolchainStatus {
    /// @ai:intent Whether the compiler can be invoked
    /// @ai:effects pure
    pub fn can_compile(&self, compiler: &str) -> bool {
        self.available.iter().any(|tool| tool.name == compiler)
    }
}

/// @ai:intent Information about a missing tool
#[derive(Debug)]
pub struct MissingTool {
    pub tool: HostTool,
    pub install_hint: &'static str,
}

/// @ai:intent Validates that required tools are installed
pub struct ToolchainValidator;

impl ToolchainValidator {
    /// @ai:intent Tools the judge invokes: the configured compiler and the GPU inspector
    /// @ai:effects pure
    fn host_tools(compiler: &CompilerConfig) -> Vec<HostTool> {
        vec![
            HostTool {
                name: compiler.program.clone(),
                purpose: "compiling submissions",
                probe_args: &["--version"],
            },
            HostTool {
                name: "nvidia-smi".to_string(),
                purpose: "GPU inspection",
                probe_args: &["-L"],
            },
        ]
    }

    /// @ai:intent Get install hint for a tool
    /// @ai:effects pure
    fn get_install_hint(tool: &str) -> &'static str {
        match tool {
            "nvcc" => "Install the CUDA Toolkit: https://developer.nvidia.com/cuda-downloads",
            "nvidia-smi" => "Install the NVIDIA driver for this GPU",
            _ => "Check tool documentation for installation instructions",
        }
    }

    /// @ai:intent Check if a command is available on the system
    /// @ai:effects io
    pub fn is_tool_available(tool: &str, args: &[&str]) -> bool {
        Command::new(tool)
            .args(args)
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// @ai:intent Validate all required tools and return status
    /// @ai:effects io
    pub fn validate(compiler: &CompilerConfig) -> ToolchainStatus {
        let mut status = ToolchainStatus::default();

        for tool in Self::host_tools(compiler) {
            if Self::is_tool_available(&tool.name, tool.probe_args) {
                status.available.push(tool);
            } else {
                let install_hint = Self::get_install_hint(&tool.name);
                status.missing_tools.push(MissingTool { tool, install_hint });
            }
        }

        status
    }

    /// @ai:intent Log warnings for missing tools
    /// @ai:effects io
    pub fn log_warnings(status: &ToolchainStatus) {
        for missing in &status.missing_tools {
            tracing::warn!(
                "Tool '{}' not found - {} is unavailable. {}",
                missing.tool.name,
                missing.tool.purpose,
                missing.install_hint
            );
        }
    }
}

/// @ai:intent Full `nvidia-smi` output, or None when the tool is missing or fails
/// @ai:effects io
pub fn nvidia_smi_report() -> Option<String> {
    let output = Command::new("nvidia-smi").output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}
