//! Subcommand implementations.
//!
//! Every workload runs generically over [`Runtime`]; [`execute`] picks the
//! concrete runtime from the resolved configuration.

pub mod matrix_mult;
pub mod platforms;
pub mod vector_add;

use anyhow::{Context as _, Result, bail};
use clkit::{
    Backend, ClkitConfig, ClkitError, Context, HostRuntime, Program, Runtime, SourceUnit,
    build_program, create_context_for_platform, create_program, get_devices, get_platforms,
    load_source,
};
use tracing::{debug, info};

use crate::cli::Commands;

/// Run `command` on the runtime selected by `config.backend`.
pub fn execute(command: &Commands, config: &ClkitConfig) -> Result<()> {
    match config.backend {
        Backend::Host => run(&HostRuntime::new(), command, config),
        #[cfg(feature = "opencl")]
        Backend::OpenCl => run(&clkit::OpenClRuntime::new(), command, config),
        #[cfg(not(feature = "opencl"))]
        Backend::OpenCl => bail!("clkit was built without the `opencl` feature"),
    }
}

fn run<R: Runtime>(rt: &R, command: &Commands, config: &ClkitConfig) -> Result<()> {
    info!(backend = %config.backend, ?command, "running");
    match *command {
        Commands::Platforms => platforms::print(&platforms::collect(rt, config)?),
        Commands::VectorAdd { len } => {
            let sum = vector_add::run(rt, config, len as usize)?;
            vector_add::print(&sum);
        }
        Commands::MatrixMult { side } => {
            let product = matrix_mult::run(rt, config, side as usize)?;
            matrix_mult::print(&product, side as usize);
        }
    }
    Ok(())
}

/// Context on the configured platform for the configured device class.
pub fn open_context<'rt, R: Runtime>(rt: &'rt R, config: &ClkitConfig) -> Result<Context<'rt, R>> {
    let platforms = get_platforms(rt)?;
    if platforms.is_empty() {
        return Err(ClkitError::NoPlatformAvailable.into());
    }
    let Some(platform) = platforms.get(config.platform_index).cloned() else {
        bail!(
            "platform index {} out of range ({} platform(s) available)",
            config.platform_index,
            platforms.len()
        );
    };
    create_context_for_platform(rt, platform, config.device_type)
        .with_context(|| format!("Failed to create a {} context", config.device_type))
}

/// The configured device of `context`.
pub fn select_device<R: Runtime>(
    context: &Context<'_, R>,
    config: &ClkitConfig,
) -> Result<R::Device> {
    let devices = get_devices(context)?;
    match devices.get(config.device_index) {
        Some(device) => {
            debug!(?device, index = config.device_index, "device selected");
            Ok(device.clone())
        }
        None => bail!(
            "device index {} out of range ({} device(s) in context)",
            config.device_index,
            devices.len()
        ),
    }
}

/// Build one of the bundled kernel sources for `device`.
///
/// With `kernel_dir` set the source is read from `<kernel_dir>/<file>`,
/// otherwise the copy embedded in the library is used.
pub fn build_bundled<'a, R: Runtime>(
    context: &'a Context<'a, R>,
    device: &R::Device,
    config: &ClkitConfig,
    file: &str,
    embedded: &str,
) -> Result<Program<'a, R>> {
    let source = match &config.kernel_dir {
        Some(dir) => load_source(dir.join(file))?,
        None => SourceUnit::from(embedded),
    };
    let mut program = create_program(context, std::slice::from_ref(&source))?;
    build_program(&mut program, std::slice::from_ref(device), &config.build_options)
        .with_context(|| format!("Failed to build {file}"))?;
    Ok(program)
}
