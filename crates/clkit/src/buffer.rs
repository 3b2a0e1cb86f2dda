//! Buffer creation and the flag-string mini-language.
//!
//! A flag string is folded left to right into [`BufferFlags`]:
//!
//! | char | meaning |
//! |------|---------|
//! | `r`  | read access (read-write if write was also requested) |
//! | `w`  | write access (read-write if read was also requested) |
//! | `h`  | use the caller's host memory |
//! | `a`  | runtime-allocated host-accessible storage |
//! | `c`  | copy the caller's host memory at creation |
//!
//! Any other character is rejected. Letters may repeat. Whether a host
//! combination is acceptable (`h` with `c`, say) is left to the runtime.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use bytemuck::Pod;
use tracing::debug;

use crate::error::{ClkitError, Result, StatusExt};
use crate::platform::Context;
use crate::runtime::{MemFlags, Runtime};

/// Device access mode of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// How a buffer relates to host memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPtrMode {
    /// Device-only storage.
    None,
    UseHost,
    AllocHost,
    CopyHost,
    AllocCopyHost,
}

/// Parsed form of a buffer flag string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    pub read: bool,
    pub write: bool,
    pub use_host: bool,
    pub alloc_host: bool,
    pub copy_host: bool,
}

impl BufferFlags {
    pub fn parse(flags: &str) -> Result<Self> {
        flags.chars().try_fold(Self::default(), |mut acc, c| {
            match c {
                'r' => acc.read = true,
                'w' => acc.write = true,
                'h' => acc.use_host = true,
                'a' => acc.alloc_host = true,
                'c' => acc.copy_host = true,
                other => return Err(ClkitError::InvalidBufferFlag(other)),
            }
            Ok(acc)
        })
    }

    /// Access mode; no access request at all means read-write.
    pub fn access(&self) -> Access {
        match (self.read, self.write) {
            (true, false) => Access::ReadOnly,
            (false, true) => Access::WriteOnly,
            _ => Access::ReadWrite,
        }
    }

    /// Host-pointer mode, or `None` for a combination no runtime accepts.
    pub fn host_mode(&self) -> Option<HostPtrMode> {
        match (self.use_host, self.alloc_host, self.copy_host) {
            (false, false, false) => Some(HostPtrMode::None),
            (true, false, false) => Some(HostPtrMode::UseHost),
            (false, true, false) => Some(HostPtrMode::AllocHost),
            (false, false, true) => Some(HostPtrMode::CopyHost),
            (false, true, true) => Some(HostPtrMode::AllocCopyHost),
            _ => None,
        }
    }

    /// Whether creation reads from caller host memory.
    pub fn needs_host_memory(&self) -> bool {
        self.use_host || self.copy_host
    }

    /// Runtime flag bits: exactly one access bit plus the host bits.
    pub fn mem_flags(&self) -> MemFlags {
        let mut flags = match self.access() {
            Access::ReadOnly => MemFlags::READ_ONLY,
            Access::WriteOnly => MemFlags::WRITE_ONLY,
            Access::ReadWrite => MemFlags::READ_WRITE,
        };
        if self.use_host {
            flags = flags | MemFlags::USE_HOST_PTR;
        }
        if self.alloc_host {
            flags = flags | MemFlags::ALLOC_HOST_PTR;
        }
        if self.copy_host {
            flags = flags | MemFlags::COPY_HOST_PTR;
        }
        flags
    }
}

impl FromStr for BufferFlags {
    type Err = ClkitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BufferFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (set, c) in [
            (self.read, 'r'),
            (self.write, 'w'),
            (self.use_host, 'h'),
            (self.alloc_host, 'a'),
            (self.copy_host, 'c'),
        ] {
            if set {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// A memory object in a context.
///
/// A buffer created over caller memory keeps that memory borrowed for its
/// whole lifetime.
pub struct Buffer<'a, R: Runtime> {
    context: &'a Context<'a, R>,
    raw: R::Buffer,
    flags: BufferFlags,
    size: usize,
    _host: PhantomData<&'a mut [u8]>,
}

impl<'a, R: Runtime> Buffer<'a, R> {
    pub fn context(&self) -> &'a Context<'a, R> {
        self.context
    }

    pub fn raw(&self) -> &R::Buffer {
        &self.raw
    }

    pub(crate) fn raw_mut(&mut self) -> &mut R::Buffer {
        &mut self.raw
    }

    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    pub fn access(&self) -> Access {
        self.flags.access()
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl<R: Runtime> fmt::Debug for Buffer<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("flags", &self.flags)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Create a buffer of `size` bytes described by the flag string `flags`.
///
/// `host` is the caller memory used by the `h` and `c` flags.
/// With `h` the memory stays borrowed until the buffer is dropped, and
/// dropping the buffer waits for kernel launches still using it.
pub fn create_buffer<'a, R: Runtime>(
    context: &'a Context<'a, R>,
    flags: &str,
    size: usize,
    host: Option<&'a mut [u8]>,
) -> Result<Buffer<'a, R>> {
    let parsed = BufferFlags::parse(flags)?;
    let mem_flags = parsed.mem_flags();
    // SAFETY: `host` is borrowed for 'a and the returned buffer cannot
    // outlive 'a, so the memory stays valid and unaliased while the
    // runtime may use it.
    let raw = unsafe { context.runtime().create_buffer(context.raw(), mem_flags, size, host) }
        .or_fail(ClkitError::BufferCreationFailed)?;
    debug!(flags = %parsed, size, "buffer created");
    Ok(Buffer { context, raw, flags: parsed, size, _host: PhantomData })
}

/// [`create_buffer`] over a typed slice; the size is the slice's byte
/// length.
pub fn create_buffer_from<'a, R: Runtime, T: Pod>(
    context: &'a Context<'a, R>,
    flags: &str,
    data: &'a mut [T],
) -> Result<Buffer<'a, R>> {
    let bytes: &'a mut [u8] = bytemuck::cast_slice_mut(data);
    create_buffer(context, flags, bytes.len(), Some(bytes))
}
