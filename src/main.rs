//! @ai:module:intent CLI for the kernel judge
//! @ai:module:layer presentation

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kernel_judge::{
    compile::{ArtifactCache, NvccToolchain, SUPPORTED_DEVICES},
    config::JudgeConfig,
    error::CompileError,
    toolchain::{nvidia_smi_report, ToolchainValidator},
};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "kernel-judge")]
#[command(about = "Compile, sandbox and benchmark GPU kernel submissions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize default configuration
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "judge.toml")]
        output: PathBuf,
    },

    /// List supported devices and their architecture codes
    Devices,

    /// Check that the compiler and nvidia-smi are installed
    Toolchain {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Compile a source file for a device through the artifact cache
    Compile {
        /// Target device name (e.g. T4, H100)
        #[arg(short, long)]
        device: String,

        /// Kernel source file
        #[arg(short, long)]
        source: PathBuf,

        /// Output name; the artifact is built as lib<name>.so
        #[arg(long, default_value = "solution")]
        output_name: String,

        /// Where to write the compiled artifact
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,

        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kernel_judge=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { output } => init_config(output),
        Commands::Devices => list_devices(),
        Commands::Toolchain { config } => check_toolchain(config),
        Commands::Compile {
            device,
            source,
            output_name,
            out,
            json,
            config,
        } => compile(device, source, output_name, out, json, config),
    }
}

/// @ai:intent Initialize default configuration file
/// @ai:effects fs:write
fn init_config(output: PathBuf) -> Result<()> {
    let config = JudgeConfig::default();
    config.save(&output)?;
    println!("Configuration saved to {}", output.display());
    Ok(())
}

/// @ai:intent Print the device capability table
/// @ai:effects io
fn list_devices() -> Result<()> {
    println!("{:<12} {:<6}", "Device", "Arch");
    println!("{}", "-".repeat(19));

    for (_, name, arch) in SUPPORTED_DEVICES {
        println!("{:<12} sm_{:<3}", name, arch);
    }

    Ok(())
}

/// @ai:intent Validate host tools and show the GPU report
/// @ai:effects io
fn check_toolchain(config: Option<PathBuf>) -> Result<()> {
    let config = load_or_default_config(config)?;
    let status = ToolchainValidator::validate(&config.compiler);
    ToolchainValidator::log_warnings(&status);

    for tool in &status.available {
        println!("  found {} ({})", tool.name, tool.purpose);
    }

    if let Some(report) = nvidia_smi_report() {
        println!();
        println!("{report}");
    }

    if !status.can_compile(&config.compiler.program) {
        bail!("compiler '{}' is not available", config.compiler.program);
    }

    Ok(())
}

/// @ai:intent Compile one source file and write the artifact or report diagnostics
/// @ai:effects fs, io
fn compile(
    device: String,
    source: PathBuf,
    output_name: String,
    out: Option<PathBuf>,
    json: bool,
    config: Option<PathBuf>,
) -> Result<()> {
    let config = load_or_default_config(config)?;
    let code = std::fs::read_to_string(&source)
        .with_context(|| format!("Failed to read {}", source.display()))?;

    let capacity = NonZeroUsize::new(config.cache.capacity).unwrap_or(NonZeroUsize::MIN);
    let cache = ArtifactCache::new(Arc::new(NvccToolchain::new(config.compiler.clone())), capacity);

    match cache.compile(&device, &code, &output_name, config.timeout()) {
        Ok(artifact) => {
            let out = out.unwrap_or_else(|| PathBuf::from(format!("lib{output_name}.so")));
            std::fs::write(&out, &artifact[..])
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Compiled {} bytes for {} to {}", artifact.len(), device, out.display());
            Ok(())
        }
        Err(CompileError::Failed(diagnostics)) => {
            if json {
                println!("{}", serde_json::to_string_pretty(diagnostics.as_ref())?);
            } else {
                eprintln!("{}", diagnostics.stderr);
            }
            bail!("compilation failed: {}", diagnostics.summary())
        }
        Err(e) => Err(e.into()),
    }
}

/// @ai:intent Load configuration or use defaults
/// @ai:effects fs:read
fn load_or_default_config(path: Option<PathBuf>) -> Result<JudgeConfig> {
    match path {
        Some(p) => JudgeConfig::load(&p).with_context(|| format!("Failed to load {}", p.display())),
        None => {
            let default_path = PathBuf::from("judge.toml");

            if default_path.exists() {
                JudgeConfig::load(&default_path)
            } else {
                Ok(JudgeConfig::default())
            }
        }
    }
}
