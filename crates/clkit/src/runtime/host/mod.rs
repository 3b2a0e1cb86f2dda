//! In-process reference runtime.
//!
//! [`HostRuntime`] implements [`Runtime`] without a driver. Platforms and
//! devices are described by a builder, kernels are Rust closures registered
//! by entry-point name, and building a program scans its OpenCL C sources
//! for `__kernel` declarations that have a registered implementation.
//! Validation follows the OpenCL rules closely enough that the helper's
//! error paths behave as they would against a real ICD.
//!
//! Two test hooks are exposed: [`HostRuntime::inject_fault`] makes a given
//! primitive fail with a chosen status, and [`HostRuntime::calls`] returns
//! every primitive call made so far. [`HostRuntime::live_objects`] counts
//! handles that have not been dropped yet.
//!
//! Commands execute synchronously at enqueue time, so every queue behaves
//! as in-order and events are complete as soon as they exist.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::error::ClStatus;
use crate::runtime::{
    ArgValue, DeviceInfo, DeviceType, EventStatus, LaunchRange, MemFlags, PlatformInfo,
    QueueProperties, Runtime, SourceUnit,
};

mod exec;
pub mod reference;
pub mod source;

pub use exec::{HostKernelFn, KernelMemory, WorkItem};

use exec::{HostArg, HostMem};

// ── Configuration ───────────────────────────────────────────────────

/// Description of one simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDeviceSpec {
    pub name: String,
    pub vendor: String,
    pub device_type: DeviceType,
}

impl HostDeviceSpec {
    pub fn new(name: impl Into<String>, device_type: DeviceType) -> Self {
        Self { name: name.into(), vendor: "clkit".to_string(), device_type }
    }
}

/// Description of one simulated platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatformSpec {
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub devices: Vec<HostDeviceSpec>,
}

impl HostPlatformSpec {
    pub fn new(name: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vendor: vendor.into(),
            version: "OpenCL 1.2 clkit-host".to_string(),
            devices: Vec::new(),
        }
    }

    #[must_use]
    pub fn device(mut self, device: HostDeviceSpec) -> Self {
        self.devices.push(device);
        self
    }
}

/// Builder for [`HostRuntime`].
#[derive(Default)]
pub struct HostRuntimeBuilder {
    platforms: Vec<HostPlatformSpec>,
    kernels: HashMap<String, HostKernelFn>,
}

impl HostRuntimeBuilder {
    #[must_use]
    pub fn platform(mut self, platform: HostPlatformSpec) -> Self {
        self.platforms.push(platform);
        self
    }

    /// Register a host implementation for the kernel `name`.
    #[must_use]
    pub fn kernel<F>(mut self, name: impl Into<String>, kernel: F) -> Self
    where
        F: Fn(&WorkItem, &KernelMemory<'_>) -> Result<(), ClStatus> + 'static,
    {
        self.kernels.insert(name.into(), Rc::new(kernel));
        self
    }

    /// Register the implementations of the bundled kernels.
    #[must_use]
    pub fn reference_kernels(self) -> Self {
        self.kernel("vector_add", reference::vector_add)
            .kernel("square_matrix_multiply", reference::square_matrix_multiply)
    }

    pub fn build(self) -> HostRuntime {
        HostRuntime {
            platforms: self.platforms,
            kernels: self.kernels,
            faults: RefCell::new(HashMap::new()),
            calls: RefCell::new(Vec::new()),
            live: Rc::new(LiveCounters::default()),
            next_id: Cell::new(1),
        }
    }
}

// ── Call log and fault injection ────────────────────────────────────

/// One primitive call, as recorded in the call log and used as a fault key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeCall {
    Platforms,
    PlatformInfo,
    CreateContext,
    ContextDevices,
    PlatformDevices,
    DeviceInfo,
    CreateProgram,
    BuildProgram,
    CreateKernel,
    KernelArity,
    SetKernelArg(u32),
    CreateBuffer,
    CreateQueue,
    EnqueueKernel,
    WaitEvent,
    EventStatus,
    ReadBuffer,
    WriteBuffer,
    Finish,
}

/// Kinds of handle tracked by the live-object counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Context,
    Program,
    Kernel,
    Buffer,
    Queue,
    Event,
}

impl ObjectKind {
    const ALL: [ObjectKind; 6] = [
        ObjectKind::Context,
        ObjectKind::Program,
        ObjectKind::Kernel,
        ObjectKind::Buffer,
        ObjectKind::Queue,
        ObjectKind::Event,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
struct LiveCounters {
    counts: [Cell<usize>; 6],
}

/// Keeps a live-object counter raised while its handle exists.
#[derive(Debug)]
struct LiveToken {
    counters: Rc<LiveCounters>,
    kind: ObjectKind,
}

impl LiveToken {
    fn new(counters: &Rc<LiveCounters>, kind: ObjectKind) -> Self {
        let cell = &counters.counts[kind.slot()];
        cell.set(cell.get() + 1);
        Self { counters: Rc::clone(counters), kind }
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        let cell = &self.counters.counts[self.kind.slot()];
        cell.set(cell.get() - 1);
        trace!(kind = ?self.kind, "host object released");
    }
}

// ── Handles ─────────────────────────────────────────────────────────

/// Platform handle: index into the configured platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostPlatform {
    index: usize,
}

/// Device handle: (platform, device) index pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostDevice {
    platform: usize,
    index: usize,
}

#[derive(Debug)]
pub struct HostContext {
    id: u64,
    devices: Vec<HostDevice>,
    _live: LiveToken,
}

#[derive(Debug)]
enum ProgramState {
    Created,
    Built(HashMap<String, u32>),
    Failed,
}

#[derive(Debug)]
pub struct HostProgram {
    context: u64,
    context_devices: Vec<HostDevice>,
    sources: Vec<String>,
    state: ProgramState,
    build_log: String,
    _live: LiveToken,
}

impl HostProgram {
    /// Build log of the last build attempt.
    pub fn build_log(&self) -> &str {
        &self.build_log
    }
}

pub struct HostKernel {
    name: String,
    context: u64,
    implementation: HostKernelFn,
    args: Vec<Option<HostArg>>,
    _live: LiveToken,
}

impl std::fmt::Debug for HostKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostKernel")
            .field("name", &self.name)
            .field("arity", &self.args.len())
            .finish()
    }
}

#[derive(Debug)]
pub struct HostBuffer {
    context: u64,
    flags: MemFlags,
    mem: HostMem,
    _live: LiveToken,
}

impl HostBuffer {
    pub fn flags(&self) -> MemFlags {
        self.flags
    }

    /// Snapshot of the buffer contents.
    pub fn contents(&self) -> Vec<u8> {
        self.mem.borrow().clone()
    }
}

#[derive(Debug)]
pub struct HostQueue {
    context: u64,
    device: HostDevice,
    properties: QueueProperties,
    _live: LiveToken,
}

impl HostQueue {
    pub fn properties(&self) -> QueueProperties {
        self.properties
    }
}

#[derive(Debug)]
pub struct HostEvent {
    status: EventStatus,
    _live: LiveToken,
}

// ── Runtime ─────────────────────────────────────────────────────────

/// The in-process reference runtime.
pub struct HostRuntime {
    platforms: Vec<HostPlatformSpec>,
    kernels: HashMap<String, HostKernelFn>,
    faults: RefCell<HashMap<RuntimeCall, ClStatus>>,
    calls: RefCell<Vec<RuntimeCall>>,
    live: Rc<LiveCounters>,
    next_id: Cell<u64>,
}

impl Default for HostRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRuntime")
            .field("platforms", &self.platforms.len())
            .field("kernels", &self.kernels.len())
            .finish()
    }
}

impl HostRuntime {
    /// One platform with a CPU and a GPU device, reference kernels
    /// registered.
    pub fn new() -> Self {
        Self::builder()
            .platform(
                HostPlatformSpec::new("clkit host", "clkit")
                    .device(HostDeviceSpec::new("host-cpu", DeviceType::CPU))
                    .device(HostDeviceSpec::new("host-gpu", DeviceType::GPU)),
            )
            .reference_kernels()
            .build()
    }

    pub fn builder() -> HostRuntimeBuilder {
        HostRuntimeBuilder::default()
    }

    /// Make every subsequent `call` fail with `status` until cleared.
    pub fn inject_fault(&self, call: RuntimeCall, status: ClStatus) {
        self.faults.borrow_mut().insert(call, status);
    }

    pub fn clear_faults(&self) {
        self.faults.borrow_mut().clear();
    }

    /// Every primitive call made so far, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Number of handles of `kind` not yet dropped.
    pub fn live(&self, kind: ObjectKind) -> usize {
        self.live.counts[kind.slot()].get()
    }

    /// Number of handles of any kind not yet dropped.
    pub fn live_objects(&self) -> usize {
        ObjectKind::ALL.iter().map(|&kind| self.live(kind)).sum()
    }

    fn enter(&self, call: RuntimeCall) -> Result<(), ClStatus> {
        self.calls.borrow_mut().push(call);
        match self.faults.borrow().get(&call) {
            Some(&status) => {
                debug!(?call, %status, "injected fault");
                Err(status)
            }
            None => Ok(()),
        }
    }

    fn fresh_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn token(&self, kind: ObjectKind) -> LiveToken {
        LiveToken::new(&self.live, kind)
    }

    fn platform_spec(&self, platform: &HostPlatform) -> Result<&HostPlatformSpec, ClStatus> {
        self.platforms.get(platform.index).ok_or(ClStatus::INVALID_PLATFORM)
    }

    fn device_spec(&self, device: &HostDevice) -> Result<&HostDeviceSpec, ClStatus> {
        self.platforms
            .get(device.platform)
            .and_then(|p| p.devices.get(device.index))
            .ok_or(ClStatus::INVALID_DEVICE)
    }

    fn matching_devices(
        &self,
        platform: &HostPlatform,
        device_type: DeviceType,
    ) -> Result<Vec<HostDevice>, ClStatus> {
        let spec = self.platform_spec(platform)?;
        let known = DeviceType::DEFAULT.bits()
            | DeviceType::CPU.bits()
            | DeviceType::GPU.bits()
            | DeviceType::ACCELERATOR.bits();
        if device_type != DeviceType::ALL
            && (device_type.bits() == 0 || device_type.bits() & !known != 0)
        {
            return Err(ClStatus::INVALID_DEVICE_TYPE);
        }
        let handles =
            (0..spec.devices.len()).map(|index| HostDevice { platform: platform.index, index });
        if device_type == DeviceType::DEFAULT {
            return Ok(handles.take(1).collect());
        }
        Ok(handles
            .zip(&spec.devices)
            .filter(|(_, d)| device_type.matches(d.device_type))
            .map(|(h, _)| h)
            .collect())
    }

    fn check_build_options(options: &str) -> Result<(), ClStatus> {
        let mut tokens = options.split_whitespace();
        while let Some(token) = tokens.next() {
            if !token.starts_with('-') {
                return Err(ClStatus::INVALID_BUILD_OPTIONS);
            }
            // `-D NAME` and `-I dir` take a separate value.
            if token == "-D" || token == "-I" {
                tokens.next().ok_or(ClStatus::INVALID_BUILD_OPTIONS)?;
            }
        }
        Ok(())
    }

    fn compile(&self, sources: &[String]) -> Result<HashMap<String, u32>, String> {
        let mut kernels = HashMap::new();
        for (unit, text) in sources.iter().enumerate() {
            let decls = source::scan_kernels(text).map_err(|msg| format!("source {unit}: {msg}"))?;
            for decl in decls {
                if !self.kernels.contains_key(&decl.name) {
                    return Err(format!(
                        "source {unit}: no host implementation for kernel '{}'",
                        decl.name
                    ));
                }
                if kernels.insert(decl.name.clone(), decl.arity).is_some() {
                    return Err(format!("source {unit}: kernel '{}' redefined", decl.name));
                }
            }
        }
        Ok(kernels)
    }
}

impl Runtime for HostRuntime {
    type Platform = HostPlatform;
    type Device = HostDevice;
    type Context = HostContext;
    type Program = HostProgram;
    type Kernel = HostKernel;
    type Buffer = HostBuffer;
    type Queue = HostQueue;
    type Event = HostEvent;

    fn platforms(&self) -> Result<Vec<HostPlatform>, ClStatus> {
        self.enter(RuntimeCall::Platforms)?;
        Ok((0..self.platforms.len()).map(|index| HostPlatform { index }).collect())
    }

    fn platform_info(&self, platform: &HostPlatform) -> Result<PlatformInfo, ClStatus> {
        self.enter(RuntimeCall::PlatformInfo)?;
        let spec = self.platform_spec(platform)?;
        Ok(PlatformInfo {
            name: spec.name.clone(),
            vendor: spec.vendor.clone(),
            version: spec.version.clone(),
        })
    }

    fn create_context(
        &self,
        platform: &HostPlatform,
        device_type: DeviceType,
    ) -> Result<HostContext, ClStatus> {
        self.enter(RuntimeCall::CreateContext)?;
        let devices = self.matching_devices(platform, device_type)?;
        if devices.is_empty() {
            return Err(ClStatus::DEVICE_NOT_FOUND);
        }
        let id = self.fresh_id();
        debug!(context = id, devices = devices.len(), "host context created");
        Ok(HostContext { id, devices, _live: self.token(ObjectKind::Context) })
    }

    fn context_devices(&self, context: &HostContext) -> Result<Vec<HostDevice>, ClStatus> {
        self.enter(RuntimeCall::ContextDevices)?;
        Ok(context.devices.clone())
    }

    fn platform_devices(
        &self,
        platform: &HostPlatform,
        device_type: DeviceType,
    ) -> Result<Vec<HostDevice>, ClStatus> {
        self.enter(RuntimeCall::PlatformDevices)?;
        self.matching_devices(platform, device_type)
    }

    fn device_info(&self, device: &HostDevice) -> Result<DeviceInfo, ClStatus> {
        self.enter(RuntimeCall::DeviceInfo)?;
        let spec = self.device_spec(device)?;
        Ok(DeviceInfo {
            name: spec.name.clone(),
            vendor: spec.vendor.clone(),
            device_type: spec.device_type,
        })
    }

    fn create_program(
        &self,
        context: &HostContext,
        sources: &[SourceUnit],
    ) -> Result<HostProgram, ClStatus> {
        self.enter(RuntimeCall::CreateProgram)?;
        if sources.is_empty() || sources.iter().any(SourceUnit::is_empty) {
            return Err(ClStatus::INVALID_VALUE);
        }
        let sources = sources
            .iter()
            .map(|s| s.as_str().map(str::to_owned))
            .collect::<Option<Vec<_>>>()
            .ok_or(ClStatus::INVALID_VALUE)?;
        Ok(HostProgram {
            context: context.id,
            context_devices: context.devices.clone(),
            sources,
            state: ProgramState::Created,
            build_log: String::new(),
            _live: self.token(ObjectKind::Program),
        })
    }

    fn build_program(
        &self,
        program: &mut HostProgram,
        devices: &[HostDevice],
        options: &str,
    ) -> Result<(), ClStatus> {
        self.enter(RuntimeCall::BuildProgram)?;
        if !matches!(program.state, ProgramState::Created) {
            return Err(ClStatus::INVALID_OPERATION);
        }
        if devices.iter().any(|d| !program.context_devices.contains(d)) {
            return Err(ClStatus::INVALID_DEVICE);
        }
        Self::check_build_options(options)?;

        match self.compile(&program.sources) {
            Ok(kernels) => {
                debug!(kernels = kernels.len(), "host program built");
                program.build_log.clear();
                program.state = ProgramState::Built(kernels);
                Ok(())
            }
            Err(log) => {
                warn!(%log, "host program build failed");
                program.build_log = log;
                program.state = ProgramState::Failed;
                Err(ClStatus::BUILD_PROGRAM_FAILURE)
            }
        }
    }

    fn create_kernel(&self, program: &HostProgram, name: &str) -> Result<HostKernel, ClStatus> {
        self.enter(RuntimeCall::CreateKernel)?;
        let ProgramState::Built(kernels) = &program.state else {
            return Err(ClStatus::INVALID_PROGRAM_EXECUTABLE);
        };
        let arity = *kernels.get(name).ok_or(ClStatus::INVALID_KERNEL_NAME)?;
        let implementation =
            self.kernels.get(name).cloned().ok_or(ClStatus::INVALID_KERNEL_NAME)?;
        Ok(HostKernel {
            name: name.to_string(),
            context: program.context,
            implementation,
            args: vec![None; arity as usize],
            _live: self.token(ObjectKind::Kernel),
        })
    }

    fn kernel_arity(&self, kernel: &HostKernel) -> Result<u32, ClStatus> {
        self.enter(RuntimeCall::KernelArity)?;
        Ok(kernel.args.len() as u32)
    }

    fn set_kernel_arg(
        &self,
        kernel: &mut HostKernel,
        index: u32,
        value: ArgValue<'_, HostBuffer>,
    ) -> Result<(), ClStatus> {
        self.enter(RuntimeCall::SetKernelArg(index))?;
        let slot = kernel.args.get_mut(index as usize).ok_or(ClStatus::INVALID_ARG_INDEX)?;
        let arg = match value {
            ArgValue::Buffer(buffer) => {
                if buffer.context != kernel.context {
                    return Err(ClStatus::INVALID_MEM_OBJECT);
                }
                HostArg::Buffer(Rc::clone(&buffer.mem))
            }
            ArgValue::Bytes(bytes) if bytes.is_empty() => return Err(ClStatus::INVALID_ARG_SIZE),
            ArgValue::Bytes(bytes) => HostArg::Scalar(bytes.to_vec()),
            ArgValue::Local(0) => return Err(ClStatus::INVALID_ARG_SIZE),
            ArgValue::Local(size) => HostArg::Local(size),
        };
        *slot = Some(arg);
        Ok(())
    }

    unsafe fn create_buffer(
        &self,
        context: &HostContext,
        flags: MemFlags,
        size: usize,
        host: Option<&mut [u8]>,
    ) -> Result<HostBuffer, ClStatus> {
        self.enter(RuntimeCall::CreateBuffer)?;
        if flags.access_bits() > 1 {
            return Err(ClStatus::INVALID_VALUE);
        }
        let use_host = flags.contains(MemFlags::USE_HOST_PTR);
        let copy_host = flags.contains(MemFlags::COPY_HOST_PTR);
        if use_host && (copy_host || flags.contains(MemFlags::ALLOC_HOST_PTR)) {
            return Err(ClStatus::INVALID_VALUE);
        }
        if size == 0 {
            return Err(ClStatus::INVALID_BUFFER_SIZE);
        }
        // Host memory is always copied: kernels run on runtime-owned
        // storage and results come back through reads.
        let data = match (host, use_host || copy_host) {
            (Some(host), true) if host.len() >= size => host[..size].to_vec(),
            (None, false) => vec![0; size],
            _ => return Err(ClStatus::INVALID_HOST_PTR),
        };
        trace!(size, flags = flags.bits(), "host buffer created");
        Ok(HostBuffer {
            context: context.id,
            flags,
            mem: Rc::new(RefCell::new(data)),
            _live: self.token(ObjectKind::Buffer),
        })
    }

    fn create_queue(
        &self,
        context: &HostContext,
        device: &HostDevice,
        properties: QueueProperties,
    ) -> Result<HostQueue, ClStatus> {
        self.enter(RuntimeCall::CreateQueue)?;
        if !context.devices.contains(device) {
            return Err(ClStatus::INVALID_DEVICE);
        }
        let known = QueueProperties::OUT_OF_ORDER_EXEC_MODE_ENABLE.bits()
            | QueueProperties::PROFILING_ENABLE.bits();
        if properties.bits() & !known != 0 {
            return Err(ClStatus::INVALID_VALUE);
        }
        debug!(context = context.id, ?device, "host queue created");
        Ok(HostQueue {
            context: context.id,
            device: *device,
            properties,
            _live: self.token(ObjectKind::Queue),
        })
    }

    fn enqueue_kernel(
        &self,
        queue: &HostQueue,
        kernel: &HostKernel,
        range: &LaunchRange,
    ) -> Result<HostEvent, ClStatus> {
        self.enter(RuntimeCall::EnqueueKernel)?;
        if queue.context != kernel.context {
            return Err(ClStatus::INVALID_CONTEXT);
        }
        let args: Vec<HostArg> = kernel
            .args
            .iter()
            .cloned()
            .collect::<Option<_>>()
            .ok_or(ClStatus::INVALID_KERNEL_ARGS)?;
        let resolved = exec::resolve_launch(range)?;

        let status = match exec::launch(&kernel.implementation, &args, resolved) {
            Ok(()) => EventStatus::Complete,
            Err(code) => {
                warn!(kernel = %kernel.name, %code, device = ?queue.device, "host kernel faulted");
                EventStatus::Error(code)
            }
        };
        Ok(HostEvent { status, _live: self.token(ObjectKind::Event) })
    }

    fn wait_event(&self, event: &HostEvent) -> Result<(), ClStatus> {
        self.enter(RuntimeCall::WaitEvent)?;
        match event.status {
            EventStatus::Error(_) => Err(ClStatus::EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST),
            _ => Ok(()),
        }
    }

    fn event_status(&self, event: &HostEvent) -> Result<EventStatus, ClStatus> {
        self.enter(RuntimeCall::EventStatus)?;
        Ok(event.status)
    }

    fn read_buffer(
        &self,
        queue: &HostQueue,
        buffer: &HostBuffer,
        offset: usize,
        dst: &mut [u8],
    ) -> Result<(), ClStatus> {
        self.enter(RuntimeCall::ReadBuffer)?;
        if queue.context != buffer.context {
            return Err(ClStatus::INVALID_CONTEXT);
        }
        let data = buffer.mem.borrow();
        let end = offset.checked_add(dst.len()).ok_or(ClStatus::INVALID_VALUE)?;
        let src = data.get(offset..end).ok_or(ClStatus::INVALID_VALUE)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn write_buffer(
        &self,
        queue: &HostQueue,
        buffer: &mut HostBuffer,
        offset: usize,
        src: &[u8],
    ) -> Result<(), ClStatus> {
        self.enter(RuntimeCall::WriteBuffer)?;
        if queue.context != buffer.context {
            return Err(ClStatus::INVALID_CONTEXT);
        }
        let mut data = buffer.mem.borrow_mut();
        let end = offset.checked_add(src.len()).ok_or(ClStatus::INVALID_VALUE)?;
        let dst = data.get_mut(offset..end).ok_or(ClStatus::INVALID_VALUE)?;
        dst.copy_from_slice(src);
        Ok(())
    }

    fn finish(&self, _queue: &HostQueue) -> Result<(), ClStatus> {
        self.enter(RuntimeCall::Finish)
    }
}
