use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clkit::{Backend, ClkitConfig, DeviceType, LogLevel};
use tracing::debug;

/// Default configuration file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "clkit.toml";

/// clkit - run the bundled compute kernels on a selected device
#[derive(Parser, Debug)]
#[command(name = "clkit")]
#[command(about = "Run the bundled compute kernels through the clkit helpers")]
#[command(long_about = r#"
clkit drives the platform → context → program → kernel → queue chain for a
couple of bundled kernels and prints the results.

Examples:
  # List platforms and their devices
  clkit platforms

  # Add two 100-element vectors on the first GPU
  clkit --device-type gpu vector-add --len 100

  # Square two 5x5 matrices built from 0..25
  clkit matrix-mult --side 5
"#)]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "PATH", global = true, env = "CLKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Runtime backend (host, opencl)
    #[arg(long, value_name = "BACKEND", global = true)]
    pub backend: Option<Backend>,

    /// Device class to select (default, cpu, gpu, accelerator, all)
    #[arg(long, value_name = "TYPE", global = true)]
    pub device_type: Option<DeviceType>,

    /// Index of the platform to use
    #[arg(long, value_name = "N", global = true)]
    pub platform: Option<usize>,

    /// Index of the device within the context
    #[arg(long, value_name = "N", global = true)]
    pub device: Option<usize>,

    /// Extra program build options
    #[arg(long, value_name = "OPTS", global = true, allow_hyphen_values = true)]
    pub build_options: Option<String>,

    /// Directory to load `.cl` sources from instead of the embedded copies
    #[arg(long, value_name = "DIR", global = true)]
    pub kernel_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List platforms and their devices
    #[command(alias = "info")]
    Platforms,

    /// Add two integer vectors element-wise
    #[command(alias = "vadd")]
    VectorAdd {
        /// Number of elements
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
        len: u32,
    },

    /// Multiply two square integer matrices
    #[command(alias = "matmul")]
    MatrixMult {
        /// Matrix side length
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..=1024))]
        side: u32,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Build the clap command, for tests and completion generators.
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}

impl Cli {
    /// Overlay the flags that were given on top of `config`.
    pub fn apply_overrides(&self, mut config: ClkitConfig) -> ClkitConfig {
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(device_type) = self.device_type {
            config.device_type = device_type;
        }
        if let Some(platform) = self.platform {
            config.platform_index = platform;
        }
        if let Some(device) = self.device {
            config.device_index = device;
        }
        if let Some(options) = &self.build_options {
            config.build_options = options.clone();
        }
        if let Some(dir) = &self.kernel_dir {
            config.kernel_dir = Some(dir.clone());
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        config
    }
}

/// File, then `CLKIT_*` environment, then command-line flags.
pub fn resolve_config(cli: &Cli) -> Result<ClkitConfig> {
    let path = cli.config.as_deref().unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
    let file = ClkitConfig::from_toml(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    let env = ClkitConfig::from_env().context("Failed to read CLKIT_* environment")?;
    let config = cli.apply_overrides(file.merge_with(&env));
    config.validate().context("Invalid configuration")?;
    debug!(?config, "resolved configuration");
    Ok(config)
}
