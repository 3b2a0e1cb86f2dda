//! Kernel source loading, program construction and build.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ClStatus, ClkitError, Result, StatusExt};
use crate::kernel::Kernel;
use crate::platform::Context;
use crate::runtime::{Runtime, SourceUnit};

/// Terminal state of a program build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    NotBuilt,
    Built,
    Failed(ClStatus),
}

/// A program constructed from sources in a context.
///
/// A program is built at most once. After a build attempt, successful or
/// not, the status is final and further builds are refused.
pub struct Program<'a, R: Runtime> {
    context: &'a Context<'a, R>,
    raw: R::Program,
    status: BuildStatus,
}

impl<'a, R: Runtime> Program<'a, R> {
    pub fn context(&self) -> &'a Context<'a, R> {
        self.context
    }

    pub fn raw(&self) -> &R::Program {
        &self.raw
    }

    pub fn status(&self) -> BuildStatus {
        self.status
    }

    pub fn is_built(&self) -> bool {
        self.status == BuildStatus::Built
    }
}

impl<R: Runtime> std::fmt::Debug for Program<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program").field("status", &self.status).finish_non_exhaustive()
    }
}

/// Read a whole file as bytes.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).map_err(|source| {
        let err = ClkitError::FileNotFound { path: path.to_path_buf(), source };
        debug!(error = %err, "source read failed");
        err
    })
}

/// Load one kernel source file as a single compilation unit.
pub fn load_source(path: impl AsRef<Path>) -> Result<SourceUnit> {
    let path = path.as_ref();
    let bytes = read_file(path)?;
    debug!(path = %path.display(), bytes = bytes.len(), "kernel source loaded");
    Ok(SourceUnit::from_bytes(bytes))
}

/// Load several source files, in order. Fails on the first unreadable path.
pub fn load_sources<I, P>(paths: I) -> Result<Vec<SourceUnit>>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    paths.into_iter().map(|p| load_source(p.into())).collect()
}

/// Construct an unbuilt program from in-memory sources.
pub fn create_program<'a, R: Runtime>(
    context: &'a Context<'a, R>,
    sources: &[SourceUnit],
) -> Result<Program<'a, R>> {
    let raw = context
        .runtime()
        .create_program(context.raw(), sources)
        .or_fail(ClkitError::ProgramCreationFailed)?;
    Ok(Program { context, raw, status: BuildStatus::NotBuilt })
}

/// Build `program` for `devices` with the given compiler options.
///
/// The runtime's build log is not collected here.
pub fn build_program<R: Runtime>(
    program: &mut Program<'_, R>,
    devices: &[R::Device],
    options: &str,
) -> Result<()> {
    if program.status != BuildStatus::NotBuilt {
        return Err(ClkitError::BuildFailed(ClStatus::INVALID_OPERATION));
    }
    let rt = program.context.runtime();
    match rt.build_program(&mut program.raw, devices, options) {
        Ok(()) => {
            program.status = BuildStatus::Built;
            debug!(devices = devices.len(), options, "program built");
            Ok(())
        }
        Err(code) => {
            program.status = BuildStatus::Failed(code);
            warn!(%code, "program build failed");
            Err(ClkitError::BuildFailed(code))
        }
    }
}

/// Load `path`, construct a program from it and build it for `devices`
/// with empty options.
pub fn load_and_build_program<'a, R: Runtime>(
    context: &'a Context<'a, R>,
    devices: &[R::Device],
    path: impl AsRef<Path>,
) -> Result<Program<'a, R>> {
    let source = load_source(path)?;
    let mut program = create_program(context, std::slice::from_ref(&source))?;
    build_program(&mut program, devices, "")?;
    Ok(program)
}

/// Resolve the kernel `entry_point` in a built program.
pub fn load_kernel<'a, R: Runtime>(
    program: &'a Program<'a, R>,
    entry_point: &str,
) -> Result<Kernel<'a, R>> {
    let not_found =
        |code| ClkitError::KernelNotFound { entry_point: entry_point.to_string(), code };
    if !program.is_built() {
        return Err(not_found(ClStatus::INVALID_PROGRAM_EXECUTABLE));
    }
    let rt = program.context.runtime();
    let raw = rt.create_kernel(&program.raw, entry_point).or_fail(not_found)?;
    let arity = rt.kernel_arity(&raw).or_fail(not_found)?;
    Ok(Kernel::new(program, raw, entry_point, arity))
}
