//! Command queues, kernel execution, events and blocking transfers.

use std::fmt;

use bytemuck::Pod;
use tracing::debug;

use crate::buffer::Buffer;
use crate::error::{ClStatus, ClkitError, Result, StatusExt};
use crate::kernel::Kernel;
use crate::platform::Context;
use crate::runtime::{EventStatus, LaunchRange, NdRange, QueueProperties, Runtime};

/// An execution channel bound to one device of a context.
pub struct Queue<'a, R: Runtime> {
    context: &'a Context<'a, R>,
    device: R::Device,
    raw: R::Queue,
    properties: QueueProperties,
}

impl<'a, R: Runtime> Queue<'a, R> {
    pub fn context(&self) -> &'a Context<'a, R> {
        self.context
    }

    pub fn device(&self) -> &R::Device {
        &self.device
    }

    pub fn raw(&self) -> &R::Queue {
        &self.raw
    }

    pub fn properties(&self) -> QueueProperties {
        self.properties
    }

    /// Block until every command submitted to this queue has completed.
    pub fn finish(&self) -> Result<()> {
        self.context.runtime().finish(&self.raw).or_fail(ClkitError::WaitFailed)
    }
}

impl<R: Runtime> fmt::Debug for Queue<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("device", &self.device)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Completion handle of one enqueued command.
pub struct Event<'q, R: Runtime> {
    queue: &'q Queue<'q, R>,
    raw: R::Event,
}

impl<R: Runtime> Event<'_, R> {
    pub fn raw(&self) -> &R::Event {
        &self.raw
    }

    /// Block until the command has finished.
    pub fn wait(&self) -> Result<()> {
        self.queue.context.runtime().wait_event(&self.raw).or_fail(ClkitError::WaitFailed)
    }

    /// Current execution status, without blocking.
    pub fn status(&self) -> Result<EventStatus> {
        self.queue.context.runtime().event_status(&self.raw).or_fail(ClkitError::WaitFailed)
    }
}

impl<R: Runtime> fmt::Debug for Event<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").finish_non_exhaustive()
    }
}

/// Create a command queue for `device` in `context`. The queue is in-order
/// unless `properties` request otherwise.
pub fn create_command_queue<'a, R: Runtime>(
    context: &'a Context<'a, R>,
    device: &R::Device,
    properties: QueueProperties,
) -> Result<Queue<'a, R>> {
    let raw = context
        .runtime()
        .create_queue(context.raw(), device, properties)
        .or_fail(ClkitError::QueueCreationFailed)?;
    debug!(?device, out_of_order = properties.is_out_of_order(), "command queue created");
    Ok(Queue { context, device: device.clone(), raw, properties })
}

/// Submit `kernel` over an ND-range. [`NdRange::NULL`] as `offset` or
/// `local` leaves the choice to the runtime.
///
/// Every parameter of the kernel must be bound; otherwise the call fails
/// with `CL_INVALID_KERNEL_ARGS` before reaching the runtime.
pub fn enqueue_nd_range_kernel<'q, R: Runtime>(
    queue: &'q Queue<'q, R>,
    kernel: &Kernel<'_, R>,
    offset: impl Into<NdRange>,
    global: impl Into<NdRange>,
    local: impl Into<NdRange>,
) -> Result<Event<'q, R>> {
    if let Some(position) = kernel.first_unbound() {
        debug!(kernel = kernel.name(), position, "enqueue with unbound argument");
        return Err(ClkitError::EnqueueFailed(ClStatus::INVALID_KERNEL_ARGS));
    }
    let range = LaunchRange { offset: offset.into(), global: global.into(), local: local.into() };
    let raw = queue
        .context
        .runtime()
        .enqueue_kernel(&queue.raw, kernel.raw(), &range)
        .or_fail(ClkitError::EnqueueFailed)?;
    debug!(kernel = kernel.name(), global = ?range.global.sizes(), "kernel enqueued");
    Ok(Event { queue, raw })
}

/// Copy `dst.len()` bytes from `buffer`, starting at `offset`, into `dst`.
/// Returns once the data is on the host.
pub fn blocking_read_buffer<R: Runtime>(
    queue: &Queue<'_, R>,
    buffer: &Buffer<'_, R>,
    offset: usize,
    dst: &mut [u8],
) -> Result<()> {
    queue
        .context
        .runtime()
        .read_buffer(&queue.raw, buffer.raw(), offset, dst)
        .or_fail(ClkitError::ReadbackFailed)
}

/// [`blocking_read_buffer`] into a typed slice; `offset` is in bytes.
pub fn blocking_read_slice<R: Runtime, T: Pod>(
    queue: &Queue<'_, R>,
    buffer: &Buffer<'_, R>,
    offset: usize,
    dst: &mut [T],
) -> Result<()> {
    blocking_read_buffer(queue, buffer, offset, bytemuck::cast_slice_mut(dst))
}

/// Copy `src` into `buffer` starting at `offset`. Returns once the runtime
/// no longer needs `src`.
pub fn blocking_write_buffer<R: Runtime>(
    queue: &Queue<'_, R>,
    buffer: &mut Buffer<'_, R>,
    offset: usize,
    src: &[u8],
) -> Result<()> {
    queue
        .context
        .runtime()
        .write_buffer(&queue.raw, buffer.raw_mut(), offset, src)
        .or_fail(ClkitError::WriteFailed)
}

/// [`blocking_write_buffer`] from a typed slice; `offset` is in bytes.
pub fn blocking_write_slice<R: Runtime, T: Pod>(
    queue: &Queue<'_, R>,
    buffer: &mut Buffer<'_, R>,
    offset: usize,
    src: &[T],
) -> Result<()> {
    blocking_write_buffer(queue, buffer, offset, bytemuck::cast_slice(src))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::create_buffer;
    use crate::kernel::set_kernel_args;
    use crate::kernels::VECTOR_ADD_SOURCE;
    use crate::platform::{create_default_context, get_devices};
    use crate::program::{build_program, create_program, load_kernel};
    use crate::runtime::host::RuntimeCall;
    use crate::runtime::{HostRuntime, SourceUnit};

    #[test]
    fn unbound_kernel_is_not_submitted() {
        let rt = HostRuntime::new();
        let ctx = create_default_context(&rt).unwrap();
        let devices = get_devices(&ctx).unwrap();
        let mut program = create_program(&ctx, &[SourceUnit::from(VECTOR_ADD_SOURCE)]).unwrap();
        build_program(&mut program, &devices, "").unwrap();
        let kernel = load_kernel(&program, "vector_add").unwrap();
        let queue = create_command_queue(&ctx, &devices[0], QueueProperties::default()).unwrap();

        rt.clear_calls();
        let err = enqueue_nd_range_kernel(&queue, &kernel, NdRange::NULL, 4, NdRange::NULL)
            .unwrap_err();
        assert!(matches!(err, ClkitError::EnqueueFailed(ClStatus::INVALID_KERNEL_ARGS)));
        assert!(rt.calls().is_empty());
    }

    #[test]
    fn write_then_read_roundtrip() {
        let rt = HostRuntime::new();
        let ctx = create_default_context(&rt).unwrap();
        let devices = get_devices(&ctx).unwrap();
        let queue = create_command_queue(&ctx, &devices[0], QueueProperties::default()).unwrap();
        let mut buffer = create_buffer(&ctx, "rw", 16, None).unwrap();

        blocking_write_slice(&queue, &mut buffer, 4, &[7u32, 8]).unwrap();
        let mut out = [0u32; 4];
        blocking_read_slice(&queue, &buffer, 0, &mut out).unwrap();
        assert_eq!(out, [0, 7, 8, 0]);

        let err = blocking_read_slice(&queue, &buffer, 8, &mut out).unwrap_err();
        assert!(matches!(err, ClkitError::ReadbackFailed(ClStatus::INVALID_VALUE)));
        queue.finish().unwrap();
    }

    #[test]
    fn faulting_kernel_surfaces_on_wait() {
        let rt = HostRuntime::new();
        let ctx = create_default_context(&rt).unwrap();
        let devices = get_devices(&ctx).unwrap();
        let mut program = create_program(&ctx, &[SourceUnit::from(VECTOR_ADD_SOURCE)]).unwrap();
        build_program(&mut program, &devices, "").unwrap();
        let mut kernel = load_kernel(&program, "vector_add").unwrap();
        let a = create_buffer(&ctx, "r", 8, None).unwrap();
        let b = create_buffer(&ctx, "r", 8, None).unwrap();
        let c = create_buffer(&ctx, "w", 8, None).unwrap();
        // n says 4 elements but the buffers hold 2.
        set_kernel_args(&mut kernel, (&a, &b, &c, 4i32)).unwrap();
        let queue = create_command_queue(&ctx, &devices[0], QueueProperties::default()).unwrap();

        let event = enqueue_nd_range_kernel(&queue, &kernel, NdRange::NULL, 4, 1).unwrap();
        assert_eq!(event.status().unwrap(), EventStatus::Error(ClStatus::OUT_OF_RESOURCES));
        let err = event.wait().unwrap_err();
        assert!(matches!(
            err,
            ClkitError::WaitFailed(ClStatus::EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST)
        ));
    }

    #[test]
    fn queue_on_foreign_device_fails() {
        let rt = HostRuntime::new();
        let ctx = create_default_context(&rt).unwrap();
        let gpu_only = crate::platform::create_context(&rt, crate::DeviceType::GPU).unwrap();
        let cpu = get_devices(&create_default_context(&rt).unwrap()).unwrap()[0];
        assert!(create_command_queue(&ctx, &cpu, QueueProperties::default()).is_ok());

        let err =
            create_command_queue(&gpu_only, &cpu, QueueProperties::default()).unwrap_err();
        assert!(matches!(err, ClkitError::QueueCreationFailed(ClStatus::INVALID_DEVICE)));
        assert!(!rt.calls().contains(&RuntimeCall::EnqueueKernel));
    }
}
