//! The seam between the helper functions and a compute runtime.
//!
//! [`Runtime`] mirrors the primitive calls of the OpenCL object model one
//! method at a time. Handle types are associated types and release their
//! runtime resource on drop, so ownership in the helper layer is plain
//! scoped ownership.
//!
//! Two implementations exist:
//!
//! - [`HostRuntime`]: an in-process reference runtime that executes
//!   registered Rust kernels. Always available.
//! - `OpenClRuntime`: the system OpenCL ICD through `opencl3`, behind the
//!   `opencl` cargo feature.
//!
//! [`DefaultRuntime`] picks the OpenCL runtime when it is compiled in.

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClStatus;

pub mod host;
#[cfg(feature = "opencl")]
pub mod opencl;

pub use host::HostRuntime;
#[cfg(feature = "opencl")]
pub use opencl::OpenClRuntime;

/// Runtime used when the caller does not pick one explicitly.
#[cfg(feature = "opencl")]
pub type DefaultRuntime = OpenClRuntime;
/// Runtime used when the caller does not pick one explicitly.
#[cfg(not(feature = "opencl"))]
pub type DefaultRuntime = HostRuntime;

// ── Device type ─────────────────────────────────────────────────────

/// Device-type filter, a bitmask over `CL_DEVICE_TYPE_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceType(u64);

impl DeviceType {
    pub const DEFAULT: Self = Self(1 << 0);
    pub const CPU: Self = Self(1 << 1);
    pub const GPU: Self = Self(1 << 2);
    pub const ACCELERATOR: Self = Self(1 << 3);
    pub const ALL: Self = Self(0xFFFF_FFFF);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Whether a device of kind `device` passes this filter.
    ///
    /// `DEFAULT` is resolved by the runtime (first device of the platform)
    /// and never matches by bits.
    pub fn matches(self, device: DeviceType) -> bool {
        self == Self::ALL || self.0 & device.0 & !Self::DEFAULT.0 != 0
    }
}

impl BitOr for DeviceType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Default for DeviceType {
    fn default() -> Self {
        Self::ALL
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DEFAULT => write!(f, "default"),
            Self::CPU => write!(f, "cpu"),
            Self::GPU => write!(f, "gpu"),
            Self::ACCELERATOR => write!(f, "accelerator"),
            Self::ALL => write!(f, "all"),
            Self(bits) => write!(f, "{bits:#x}"),
        }
    }
}

/// Error for an unrecognised device-type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device type: {0}")]
pub struct UnknownDeviceType(pub String);

impl FromStr for DeviceType {
    type Err = UnknownDeviceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::DEFAULT),
            "cpu" => Ok(Self::CPU),
            "gpu" => Ok(Self::GPU),
            "accelerator" | "acc" => Ok(Self::ACCELERATOR),
            "all" => Ok(Self::ALL),
            other => Err(UnknownDeviceType(other.to_string())),
        }
    }
}

impl TryFrom<String> for DeviceType {
    type Error = UnknownDeviceType;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DeviceType> for String {
    fn from(t: DeviceType) -> Self {
        t.to_string()
    }
}

// ── Memory flags ────────────────────────────────────────────────────

/// Buffer creation flags, a bitmask over `CL_MEM_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemFlags(u64);

impl MemFlags {
    pub const READ_WRITE: Self = Self(1 << 0);
    pub const WRITE_ONLY: Self = Self(1 << 1);
    pub const READ_ONLY: Self = Self(1 << 2);
    pub const USE_HOST_PTR: Self = Self(1 << 3);
    pub const ALLOC_HOST_PTR: Self = Self(1 << 4);
    pub const COPY_HOST_PTR: Self = Self(1 << 5);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Number of access-mode bits set (read-write, write-only, read-only).
    pub const fn access_bits(self) -> u32 {
        (self.0 & (Self::READ_WRITE.0 | Self::WRITE_ONLY.0 | Self::READ_ONLY.0)).count_ones()
    }
}

impl BitOr for MemFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ── Queue properties ────────────────────────────────────────────────

/// Command queue properties, a bitmask over `CL_QUEUE_*`.
///
/// The default is an in-order queue without profiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QueueProperties(u64);

impl QueueProperties {
    pub const OUT_OF_ORDER_EXEC_MODE_ENABLE: Self = Self(1 << 0);
    pub const PROFILING_ENABLE: Self = Self(1 << 1);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_out_of_order(self) -> bool {
        self.contains(Self::OUT_OF_ORDER_EXEC_MODE_ENABLE)
    }
}

impl BitOr for QueueProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ── ND-range ────────────────────────────────────────────────────────

/// An N-dimensional index space (0 to 3 dimensions).
///
/// [`NdRange::NULL`] has zero dimensions and stands for "let the runtime
/// decide" when used as an offset or a local range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NdRange {
    dims: u32,
    sizes: [usize; 3],
}

impl NdRange {
    pub const NULL: Self = Self { dims: 0, sizes: [0; 3] };

    pub const fn d1(x: usize) -> Self {
        Self { dims: 1, sizes: [x, 0, 0] }
    }

    pub const fn d2(x: usize, y: usize) -> Self {
        Self { dims: 2, sizes: [x, y, 0] }
    }

    pub const fn d3(x: usize, y: usize, z: usize) -> Self {
        Self { dims: 3, sizes: [x, y, z] }
    }

    pub const fn dims(&self) -> u32 {
        self.dims
    }

    pub const fn is_null(&self) -> bool {
        self.dims == 0
    }

    /// Sizes of the populated dimensions.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes[..self.dims as usize]
    }

    /// All three slots, unpopulated ones zero.
    pub const fn raw(&self) -> &[usize; 3] {
        &self.sizes
    }

    /// Total number of work items (1 for the null range).
    pub fn total(&self) -> usize {
        self.sizes().iter().product()
    }
}

impl Default for NdRange {
    fn default() -> Self {
        Self::NULL
    }
}

impl From<usize> for NdRange {
    fn from(x: usize) -> Self {
        Self::d1(x)
    }
}

impl From<(usize, usize)> for NdRange {
    fn from((x, y): (usize, usize)) -> Self {
        Self::d2(x, y)
    }
}

impl From<(usize, usize, usize)> for NdRange {
    fn from((x, y, z): (usize, usize, usize)) -> Self {
        Self::d3(x, y, z)
    }
}

/// Offset, global and local ranges of one kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchRange {
    pub offset: NdRange,
    pub global: NdRange,
    pub local: NdRange,
}

// ── Sources, arguments, info records ────────────────────────────────

/// One compilation unit: the full text of a kernel source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    bytes: Vec<u8>,
}

impl SourceUnit {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Source text, or `None` when the bytes are not UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&str> for SourceUnit {
    fn from(s: &str) -> Self {
        Self { bytes: s.as_bytes().to_vec() }
    }
}

impl From<String> for SourceUnit {
    fn from(s: String) -> Self {
        Self { bytes: s.into_bytes() }
    }
}

/// A single kernel argument as handed to the runtime.
#[derive(Debug, Clone, Copy)]
pub enum ArgValue<'a, B> {
    /// A memory object.
    Buffer(&'a B),
    /// A by-value argument, as raw bytes.
    Bytes(&'a [u8]),
    /// A `__local` allocation of the given size in bytes.
    Local(usize),
}

/// Descriptive information about a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub name: String,
    pub vendor: String,
    pub version: String,
}

/// Descriptive information about a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor: String,
    pub device_type: DeviceType,
}

/// Execution status of an enqueued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Queued,
    Submitted,
    Running,
    Complete,
    /// Terminated abnormally with the given status.
    Error(ClStatus),
}

impl EventStatus {
    /// Map a `CL_EVENT_COMMAND_EXECUTION_STATUS` value.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            3 => Self::Queued,
            2 => Self::Submitted,
            1 => Self::Running,
            0 => Self::Complete,
            code => Self::Error(ClStatus(code)),
        }
    }
}

// ── Runtime trait ───────────────────────────────────────────────────

/// Primitive operations of a compute runtime.
///
/// Every method is a single runtime call that either yields a handle or a
/// native [`ClStatus`]. Handles release their resource on drop.
pub trait Runtime {
    type Platform: Clone + fmt::Debug;
    type Device: Clone + fmt::Debug + PartialEq;
    type Context;
    type Program;
    type Kernel;
    type Buffer;
    type Queue;
    type Event;

    fn platforms(&self) -> Result<Vec<Self::Platform>, ClStatus>;

    fn platform_info(&self, platform: &Self::Platform) -> Result<PlatformInfo, ClStatus>;

    fn create_context(
        &self,
        platform: &Self::Platform,
        device_type: DeviceType,
    ) -> Result<Self::Context, ClStatus>;

    fn context_devices(&self, context: &Self::Context) -> Result<Vec<Self::Device>, ClStatus>;

    fn platform_devices(
        &self,
        platform: &Self::Platform,
        device_type: DeviceType,
    ) -> Result<Vec<Self::Device>, ClStatus>;

    fn device_info(&self, device: &Self::Device) -> Result<DeviceInfo, ClStatus>;

    fn create_program(
        &self,
        context: &Self::Context,
        sources: &[SourceUnit],
    ) -> Result<Self::Program, ClStatus>;

    fn build_program(
        &self,
        program: &mut Self::Program,
        devices: &[Self::Device],
        options: &str,
    ) -> Result<(), ClStatus>;

    fn create_kernel(&self, program: &Self::Program, name: &str) -> Result<Self::Kernel, ClStatus>;

    /// Number of parameters the kernel declares.
    fn kernel_arity(&self, kernel: &Self::Kernel) -> Result<u32, ClStatus>;

    fn set_kernel_arg(
        &self,
        kernel: &mut Self::Kernel,
        index: u32,
        value: ArgValue<'_, Self::Buffer>,
    ) -> Result<(), ClStatus>;

    /// Create a buffer of `size` bytes.
    ///
    /// # Safety
    ///
    /// With [`MemFlags::USE_HOST_PTR`] the runtime may keep using `host`
    /// after this call returns. The caller must keep that memory alive and
    /// otherwise untouched for as long as the returned buffer exists.
    unsafe fn create_buffer(
        &self,
        context: &Self::Context,
        flags: MemFlags,
        size: usize,
        host: Option<&mut [u8]>,
    ) -> Result<Self::Buffer, ClStatus>;

    fn create_queue(
        &self,
        context: &Self::Context,
        device: &Self::Device,
        properties: QueueProperties,
    ) -> Result<Self::Queue, ClStatus>;

    fn enqueue_kernel(
        &self,
        queue: &Self::Queue,
        kernel: &Self::Kernel,
        range: &LaunchRange,
    ) -> Result<Self::Event, ClStatus>;

    fn wait_event(&self, event: &Self::Event) -> Result<(), ClStatus>;

    fn event_status(&self, event: &Self::Event) -> Result<EventStatus, ClStatus>;

    /// Blocking copy of `dst.len()` bytes starting at `offset`.
    fn read_buffer(
        &self,
        queue: &Self::Queue,
        buffer: &Self::Buffer,
        offset: usize,
        dst: &mut [u8],
    ) -> Result<(), ClStatus>;

    /// Blocking copy of `src` into the buffer starting at `offset`.
    fn write_buffer(
        &self,
        queue: &Self::Queue,
        buffer: &mut Self::Buffer,
        offset: usize,
        src: &[u8],
    ) -> Result<(), ClStatus>;

    fn finish(&self, queue: &Self::Queue) -> Result<(), ClStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_filter_semantics() {
        assert!(DeviceType::ALL.matches(DeviceType::GPU));
        assert!(DeviceType::CPU.matches(DeviceType::CPU));
        assert!(!DeviceType::CPU.matches(DeviceType::GPU));
        assert!((DeviceType::CPU | DeviceType::GPU).matches(DeviceType::GPU));
        assert!(!DeviceType::DEFAULT.matches(DeviceType::CPU | DeviceType::DEFAULT));
    }

    #[test]
    fn device_type_names_roundtrip() {
        for t in [
            DeviceType::DEFAULT,
            DeviceType::CPU,
            DeviceType::GPU,
            DeviceType::ACCELERATOR,
            DeviceType::ALL,
        ] {
            assert_eq!(t.to_string().parse::<DeviceType>().unwrap(), t);
        }
        assert!("fpga".parse::<DeviceType>().is_err());
    }

    #[test]
    fn nd_range_shapes() {
        assert_eq!(NdRange::NULL.dims(), 0);
        assert_eq!(NdRange::NULL.total(), 1);
        assert_eq!(NdRange::from(100).sizes(), &[100]);
        assert_eq!(NdRange::from((5, 5)).total(), 25);
        assert_eq!(NdRange::d3(2, 3, 4).sizes(), &[2, 3, 4]);
    }

    #[test]
    fn mem_flags_count_access_bits() {
        assert_eq!(MemFlags::empty().access_bits(), 0);
        assert_eq!((MemFlags::READ_ONLY | MemFlags::USE_HOST_PTR).access_bits(), 1);
        assert_eq!((MemFlags::READ_ONLY | MemFlags::READ_WRITE).access_bits(), 2);
    }

    #[test]
    fn event_status_from_raw() {
        assert_eq!(EventStatus::from_raw(0), EventStatus::Complete);
        assert_eq!(EventStatus::from_raw(3), EventStatus::Queued);
        assert_eq!(EventStatus::from_raw(-5), EventStatus::Error(ClStatus::OUT_OF_RESOURCES));
    }
}
