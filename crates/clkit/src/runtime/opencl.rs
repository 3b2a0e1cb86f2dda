//! [`Runtime`] over the system OpenCL ICD loader, via `opencl3`.
//!
//! Handles are thin wrappers over the `opencl3` objects, which release the
//! underlying OpenCL object on drop. Buffers bound to a kernel are tracked
//! through a liveness token so that enqueueing a kernel whose buffer has
//! since been released fails with `CL_INVALID_MEM_OBJECT` instead of handing
//! a dangling `cl_mem` to the driver.
//!
//! A buffer created over caller memory (`CL_MEM_USE_HOST_PTR`) also records
//! the kernel launches that use it, and dropping it waits for them: the
//! caller's borrow of that memory ends with the buffer, while the driver
//! defers the release until pending commands are done.

use std::cell::RefCell;
use std::ffi::c_void;
use std::ptr;
use std::rc::{Rc, Weak};

use opencl3::command_queue::CommandQueue;
use opencl3::context::Context as ClContext;
use opencl3::device::Device as ClDevice;
use opencl3::error_codes::ClError;
use opencl3::event::Event as ClEvent;
use opencl3::kernel::{Kernel as ClKernel, set_kernel_arg};
use opencl3::memory::{Buffer as ClBuffer, ClMem};
use opencl3::platform::{Platform as ClPlatform, get_platforms};
use opencl3::program::Program as ClProgram;
use opencl3::types::{CL_BLOCKING, cl_device_id, cl_platform_id};
use tracing::{debug, info, warn};

use crate::error::ClStatus;
use crate::runtime::{
    ArgValue, DeviceInfo, DeviceType, EventStatus, LaunchRange, MemFlags, NdRange, PlatformInfo,
    QueueProperties, Runtime, SourceUnit,
};

fn status(err: ClError) -> ClStatus {
    ClStatus(err.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenClPlatform(cl_platform_id);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenClDevice(cl_device_id);

impl OpenClDevice {
    pub fn id(&self) -> cl_device_id {
        self.0
    }
}

pub struct OpenClKernel {
    kernel: ClKernel,
    bound: Vec<Option<Weak<BufferUse>>>,
}

/// Launches still in flight against a buffer.
#[derive(Default)]
struct BufferUse {
    host_backed: bool,
    pending: RefCell<Vec<Rc<ClEvent>>>,
}

impl BufferUse {
    fn record(&self, event: &Rc<ClEvent>) {
        let mut pending = self.pending.borrow_mut();
        // Positive statuses are queued, submitted or running.
        pending.retain(|e| e.command_execution_status().is_ok_and(|s| s.0 > 0));
        pending.push(Rc::clone(event));
    }
}

pub struct OpenClBuffer {
    buffer: ClBuffer<u8>,
    uses: Rc<BufferUse>,
}

impl Drop for OpenClBuffer {
    fn drop(&mut self) {
        if !self.uses.host_backed {
            return;
        }
        for event in self.uses.pending.borrow_mut().drain(..) {
            if let Err(err) = event.wait() {
                warn!(code = err.0, "pending kernel failed while releasing host-backed buffer");
            }
        }
    }
}

/// Completion handle of one kernel launch.
pub struct OpenClEvent(Rc<ClEvent>);

/// The system OpenCL runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenClRuntime;

impl OpenClRuntime {
    pub fn new() -> Self {
        Self
    }
}

fn range_ptr(range: &NdRange) -> *const usize {
    if range.is_null() { ptr::null() } else { range.raw().as_ptr() }
}

impl Runtime for OpenClRuntime {
    type Platform = OpenClPlatform;
    type Device = OpenClDevice;
    type Context = ClContext;
    type Program = ClProgram;
    type Kernel = OpenClKernel;
    type Buffer = OpenClBuffer;
    type Queue = CommandQueue;
    type Event = OpenClEvent;

    fn platforms(&self) -> Result<Vec<OpenClPlatform>, ClStatus> {
        // An ICD loader without any installed platform reports
        // CL_PLATFORM_NOT_FOUND_KHR; that is an empty list to the caller.
        match get_platforms() {
            Ok(platforms) => Ok(platforms.iter().map(|p| OpenClPlatform(p.id())).collect()),
            Err(ClError(-1001)) => Ok(Vec::new()),
            Err(err) => Err(status(err)),
        }
    }

    fn platform_info(&self, platform: &OpenClPlatform) -> Result<PlatformInfo, ClStatus> {
        let p = ClPlatform::new(platform.0);
        Ok(PlatformInfo {
            name: p.name().map_err(status)?,
            vendor: p.vendor().map_err(status)?,
            version: p.version().map_err(status)?,
        })
    }

    fn create_context(
        &self,
        platform: &OpenClPlatform,
        device_type: DeviceType,
    ) -> Result<ClContext, ClStatus> {
        let devices = ClPlatform::new(platform.0).get_devices(device_type.bits()).map_err(status)?;
        let context =
            ClContext::from_devices(&devices, &[], None, ptr::null_mut()).map_err(status)?;
        info!(devices = devices.len(), device_type = %device_type, "OpenCL context created");
        Ok(context)
    }

    fn context_devices(&self, context: &ClContext) -> Result<Vec<OpenClDevice>, ClStatus> {
        Ok(context.devices().iter().map(|&id| OpenClDevice(id)).collect())
    }

    fn platform_devices(
        &self,
        platform: &OpenClPlatform,
        device_type: DeviceType,
    ) -> Result<Vec<OpenClDevice>, ClStatus> {
        match ClPlatform::new(platform.0).get_devices(device_type.bits()) {
            Ok(ids) => Ok(ids.into_iter().map(OpenClDevice).collect()),
            Err(ref err) if ClStatus(err.0) == ClStatus::DEVICE_NOT_FOUND => Ok(Vec::new()),
            Err(err) => Err(status(err)),
        }
    }

    fn device_info(&self, device: &OpenClDevice) -> Result<DeviceInfo, ClStatus> {
        let d = ClDevice::new(device.0);
        Ok(DeviceInfo {
            name: d.name().map_err(status)?,
            vendor: d.vendor().map_err(status)?,
            device_type: DeviceType::from_bits(d.dev_type().map_err(status)?),
        })
    }

    fn create_program(
        &self,
        context: &ClContext,
        sources: &[SourceUnit],
    ) -> Result<ClProgram, ClStatus> {
        let texts = sources
            .iter()
            .map(SourceUnit::as_str)
            .collect::<Option<Vec<&str>>>()
            .ok_or(ClStatus::INVALID_VALUE)?;
        ClProgram::create_from_sources(context, &texts).map_err(status)
    }

    fn build_program(
        &self,
        program: &mut ClProgram,
        devices: &[OpenClDevice],
        options: &str,
    ) -> Result<(), ClStatus> {
        let ids: Vec<cl_device_id> = devices.iter().map(OpenClDevice::id).collect();
        program.build(&ids, options).map_err(|err| {
            for &id in &ids {
                if let Ok(log) = program.get_build_log(id) {
                    warn!(device = ?id, %log, "OpenCL build log");
                }
            }
            status(err)
        })
    }

    fn create_kernel(&self, program: &ClProgram, name: &str) -> Result<OpenClKernel, ClStatus> {
        let kernel = ClKernel::create(program, name).map_err(status)?;
        let arity = kernel.num_args().map_err(status)? as usize;
        Ok(OpenClKernel { kernel, bound: vec![None; arity] })
    }

    fn kernel_arity(&self, kernel: &OpenClKernel) -> Result<u32, ClStatus> {
        kernel.kernel.num_args().map_err(status)
    }

    fn set_kernel_arg(
        &self,
        kernel: &mut OpenClKernel,
        index: u32,
        value: ArgValue<'_, OpenClBuffer>,
    ) -> Result<(), ClStatus> {
        let slot = kernel.bound.get_mut(index as usize).ok_or(ClStatus::INVALID_ARG_INDEX)?;
        // SAFETY: each variant passes a pointer/size pair that is valid for
        // the duration of the call; OpenCL copies argument values.
        unsafe {
            match value {
                ArgValue::Buffer(buffer) => {
                    kernel.kernel.set_arg(index, &buffer.buffer.get()).map_err(status)?;
                    *slot = Some(Rc::downgrade(&buffer.uses));
                }
                ArgValue::Bytes(bytes) => {
                    set_kernel_arg(
                        kernel.kernel.get(),
                        index,
                        bytes.len(),
                        bytes.as_ptr().cast::<c_void>(),
                    )
                    .map_err(ClStatus)?;
                    *slot = None;
                }
                ArgValue::Local(size) => {
                    kernel.kernel.set_arg_local_buffer(index, size).map_err(status)?;
                    *slot = None;
                }
            }
        }
        Ok(())
    }

    unsafe fn create_buffer(
        &self,
        context: &ClContext,
        flags: MemFlags,
        size: usize,
        host: Option<&mut [u8]>,
    ) -> Result<OpenClBuffer, ClStatus> {
        let host_ptr = match host {
            Some(host) if host.len() < size => return Err(ClStatus::INVALID_HOST_PTR),
            Some(host) => host.as_mut_ptr().cast::<c_void>(),
            None => ptr::null_mut(),
        };
        // SAFETY: forwarded from the caller's contract on `host`.
        let buffer = unsafe { ClBuffer::<u8>::create(context, flags.bits(), size, host_ptr) }
            .map_err(status)?;
        let host_backed = flags.contains(MemFlags::USE_HOST_PTR);
        Ok(OpenClBuffer { buffer, uses: Rc::new(BufferUse { host_backed, ..Default::default() }) })
    }

    fn create_queue(
        &self,
        context: &ClContext,
        device: &OpenClDevice,
        properties: QueueProperties,
    ) -> Result<CommandQueue, ClStatus> {
        // SAFETY: context and device are live handles owned by the caller.
        let queue = unsafe {
            CommandQueue::create_with_properties(context, device.0, properties.bits(), 0)
        }
        .map_err(status)?;
        debug!(device = ?device.0, properties = properties.bits(), "OpenCL queue created");
        Ok(queue)
    }

    fn enqueue_kernel(
        &self,
        queue: &CommandQueue,
        kernel: &OpenClKernel,
        range: &LaunchRange,
    ) -> Result<OpenClEvent, ClStatus> {
        let uses = kernel
            .bound
            .iter()
            .flatten()
            .map(Weak::upgrade)
            .collect::<Option<Vec<_>>>()
            .ok_or(ClStatus::INVALID_MEM_OBJECT)?;
        // SAFETY: the range arrays are three slots wide, which covers any
        // work_dim the driver accepts, and outlive the call.
        let event = unsafe {
            queue.enqueue_nd_range_kernel(
                kernel.kernel.get(),
                range.global.dims(),
                range_ptr(&range.offset),
                range_ptr(&range.global),
                range_ptr(&range.local),
                &[],
            )
        }
        .map_err(status)?;
        let event = Rc::new(event);
        for buffer in uses.iter().filter(|u| u.host_backed) {
            buffer.record(&event);
        }
        Ok(OpenClEvent(event))
    }

    fn wait_event(&self, event: &OpenClEvent) -> Result<(), ClStatus> {
        event.0.wait().map_err(status)
    }

    fn event_status(&self, event: &OpenClEvent) -> Result<EventStatus, ClStatus> {
        let raw = event.0.command_execution_status().map_err(status)?;
        Ok(EventStatus::from_raw(raw.0))
    }

    fn read_buffer(
        &self,
        queue: &CommandQueue,
        buffer: &OpenClBuffer,
        offset: usize,
        dst: &mut [u8],
    ) -> Result<(), ClStatus> {
        // SAFETY: the read is blocking, so `dst` is filled before returning.
        unsafe { queue.enqueue_read_buffer(&buffer.buffer, CL_BLOCKING, offset, dst, &[]) }
            .map(drop)
            .map_err(status)
    }

    fn write_buffer(
        &self,
        queue: &CommandQueue,
        buffer: &mut OpenClBuffer,
        offset: usize,
        src: &[u8],
    ) -> Result<(), ClStatus> {
        // SAFETY: the write is blocking, so `src` is consumed before returning.
        unsafe { queue.enqueue_write_buffer(&mut buffer.buffer, CL_BLOCKING, offset, src, &[]) }
            .map(drop)
            .map_err(status)
    }

    fn finish(&self, queue: &CommandQueue) -> Result<(), ClStatus> {
        queue.finish().map_err(status)
    }
}
