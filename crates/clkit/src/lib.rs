//! Thin, fail-checked helpers over the OpenCL object model.
//!
//! The crate wraps the verbose platform / context / program / kernel /
//! queue / buffer / event API behind a small set of functions that follow
//! the natural acquisition chain:
//!
//! ```text
//! get_platforms → create_context → get_devices
//!   → load_and_build_program → load_kernel → set_kernel_args
//!   → create_command_queue → enqueue_nd_range_kernel → blocking_read_buffer
//! ```
//!
//! Each step hands its output to the next one. Handles release their
//! runtime object on drop and borrow the object they were created from, so
//! a context outlives its programs, buffers and queues, and a program
//! outlives its kernels. Every runtime failure becomes a [`ClkitError`]
//! carrying the native status code.
//!
//! The runtime itself sits behind the [`Runtime`] trait:
//! [`HostRuntime`] executes registered Rust kernels in-process, and
//! `OpenClRuntime` (feature `opencl`) drives the system OpenCL ICD.

pub mod buffer;
pub mod config;
pub mod error;
pub mod kernel;
pub mod kernels;
pub mod platform;
pub mod program;
pub mod queue;
pub mod runtime;

pub use buffer::{Access, Buffer, BufferFlags, HostPtrMode, create_buffer, create_buffer_from};
pub use config::{Backend, ClkitConfig, ConfigError, LogLevel};
pub use error::{ClStatus, ClkitError, Result};
pub use kernel::{Kernel, KernelArg, KernelArgs, LocalMemory, set_kernel_args};
pub use platform::{
    Context, create_context, create_context_for_platform, create_default_context, device_info,
    get_devices, get_platform_devices, get_platform_name, get_platforms, get_vendor,
};
pub use program::{
    BuildStatus, Program, build_program, create_program, load_and_build_program, load_kernel,
    load_source, load_sources, read_file,
};
pub use queue::{
    Event, Queue, blocking_read_buffer, blocking_read_slice, blocking_write_buffer,
    blocking_write_slice, create_command_queue, enqueue_nd_range_kernel,
};
#[cfg(feature = "opencl")]
pub use runtime::OpenClRuntime;
pub use runtime::{
    DefaultRuntime, DeviceInfo, DeviceType, EventStatus, HostRuntime, MemFlags, NdRange,
    PlatformInfo, QueueProperties, Runtime, SourceUnit,
};
