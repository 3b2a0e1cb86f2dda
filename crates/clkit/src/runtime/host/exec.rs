//! Work-item execution for host kernels.

use std::cell::RefCell;
use std::rc::Rc;

use bytemuck::Pod;

use crate::error::ClStatus;
use crate::runtime::LaunchRange;

/// Backing storage of a host buffer, shared with kernels it is bound to.
pub(crate) type HostMem = Rc<RefCell<Vec<u8>>>;

/// Signature of a host kernel: invoked once per work item.
pub type HostKernelFn = Rc<dyn Fn(&WorkItem, &KernelMemory<'_>) -> Result<(), ClStatus>>;

/// A bound kernel argument.
#[derive(Clone)]
pub(crate) enum HostArg {
    Buffer(HostMem),
    Scalar(Vec<u8>),
    Local(usize),
}

/// Index-space coordinates of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    work_dim: u32,
    global_id: [usize; 3],
    global_size: [usize; 3],
    global_offset: [usize; 3],
    local_id: [usize; 3],
    local_size: [usize; 3],
    group_id: [usize; 3],
}

impl WorkItem {
    pub fn work_dim(&self) -> u32 {
        self.work_dim
    }

    pub fn global_id(&self, dim: usize) -> usize {
        self.global_id.get(dim).copied().unwrap_or(0)
    }

    pub fn global_size(&self, dim: usize) -> usize {
        self.global_size.get(dim).copied().unwrap_or(1)
    }

    pub fn global_offset(&self, dim: usize) -> usize {
        self.global_offset.get(dim).copied().unwrap_or(0)
    }

    pub fn local_id(&self, dim: usize) -> usize {
        self.local_id.get(dim).copied().unwrap_or(0)
    }

    pub fn local_size(&self, dim: usize) -> usize {
        self.local_size.get(dim).copied().unwrap_or(1)
    }

    pub fn group_id(&self, dim: usize) -> usize {
        self.group_id.get(dim).copied().unwrap_or(0)
    }
}

/// Typed access to a kernel's bound arguments during execution.
///
/// Element accesses outside a buffer fail with `CL_OUT_OF_RESOURCES`, the
/// status a device reports for a faulting kernel.
pub struct KernelMemory<'a> {
    args: &'a [HostArg],
    locals: &'a [RefCell<Vec<u8>>],
}

impl KernelMemory<'_> {
    fn storage(&self, arg: usize) -> Result<&RefCell<Vec<u8>>, ClStatus> {
        match self.args.get(arg) {
            Some(HostArg::Buffer(mem)) => Ok(mem),
            Some(HostArg::Local(_)) => Ok(&self.locals[arg]),
            Some(HostArg::Scalar(_)) => Err(ClStatus::INVALID_ARG_VALUE),
            None => Err(ClStatus::INVALID_ARG_INDEX),
        }
    }

    /// Read element `index` of the buffer bound at `arg`.
    pub fn load<T: Pod>(&self, arg: usize, index: usize) -> Result<T, ClStatus> {
        let size = std::mem::size_of::<T>();
        let data = self.storage(arg)?.borrow();
        let start = index.checked_mul(size).ok_or(ClStatus::OUT_OF_RESOURCES)?;
        let bytes = data.get(start..start + size).ok_or(ClStatus::OUT_OF_RESOURCES)?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Write element `index` of the buffer bound at `arg`.
    pub fn store<T: Pod>(&self, arg: usize, index: usize, value: T) -> Result<(), ClStatus> {
        let size = std::mem::size_of::<T>();
        let mut data = self.storage(arg)?.borrow_mut();
        let start = index.checked_mul(size).ok_or(ClStatus::OUT_OF_RESOURCES)?;
        let bytes = data.get_mut(start..start + size).ok_or(ClStatus::OUT_OF_RESOURCES)?;
        bytes.copy_from_slice(bytemuck::bytes_of(&value));
        Ok(())
    }

    /// Number of `T` elements in the buffer bound at `arg`.
    pub fn len<T: Pod>(&self, arg: usize) -> Result<usize, ClStatus> {
        Ok(self.storage(arg)?.borrow().len() / std::mem::size_of::<T>())
    }

    /// Value of the by-value argument at `arg`.
    pub fn scalar<T: Pod>(&self, arg: usize) -> Result<T, ClStatus> {
        match self.args.get(arg) {
            Some(HostArg::Scalar(bytes)) if bytes.len() == std::mem::size_of::<T>() => {
                Ok(bytemuck::pod_read_unaligned(bytes))
            }
            Some(HostArg::Scalar(_)) => Err(ClStatus::INVALID_ARG_SIZE),
            Some(_) => Err(ClStatus::INVALID_ARG_VALUE),
            None => Err(ClStatus::INVALID_ARG_INDEX),
        }
    }
}

/// Check a launch against the OpenCL rules and resolve it to three-slot
/// offset/global/local arrays.
pub(crate) fn resolve_launch(range: &LaunchRange) -> Result<Resolved, ClStatus> {
    let work_dim = range.global.dims();
    if !(1..=3).contains(&work_dim) {
        return Err(ClStatus::INVALID_WORK_DIMENSION);
    }
    let dims = work_dim as usize;
    // Trailing components beyond the global dimensionality are ignored.
    if !range.offset.is_null() && range.offset.dims() < work_dim {
        return Err(ClStatus::INVALID_GLOBAL_OFFSET);
    }
    if !range.local.is_null() && range.local.dims() < work_dim {
        return Err(ClStatus::INVALID_WORK_DIMENSION);
    }

    let mut resolved = Resolved {
        work_dim,
        offset: [0; 3],
        global: [1; 3],
        local: [1; 3],
    };
    for d in 0..dims {
        let global = range.global.raw()[d];
        if global == 0 {
            return Err(ClStatus::INVALID_GLOBAL_WORK_SIZE);
        }
        resolved.global[d] = global;
        if !range.offset.is_null() {
            let offset = range.offset.raw()[d];
            // The last global id must still be representable.
            offset.checked_add(global).ok_or(ClStatus::INVALID_GLOBAL_OFFSET)?;
            resolved.offset[d] = offset;
        }
        if !range.local.is_null() {
            let local = range.local.raw()[d];
            if local == 0 || global % local != 0 {
                return Err(ClStatus::INVALID_WORK_GROUP_SIZE);
            }
            resolved.local[d] = local;
        }
    }
    Ok(resolved)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Resolved {
    work_dim: u32,
    offset: [usize; 3],
    global: [usize; 3],
    local: [usize; 3],
}

/// Run `kernel` over every work item, group by group, in row-major order
/// (dimension 0 fastest). Stops at the first failing work item.
pub(crate) fn launch(
    kernel: &HostKernelFn,
    args: &[HostArg],
    resolved: Resolved,
) -> Result<(), ClStatus> {
    let groups = [
        resolved.global[0] / resolved.local[0],
        resolved.global[1] / resolved.local[1],
        resolved.global[2] / resolved.local[2],
    ];
    let locals: Vec<RefCell<Vec<u8>>> = args
        .iter()
        .map(|arg| match arg {
            HostArg::Local(size) => RefCell::new(vec![0; *size]),
            _ => RefCell::new(Vec::new()),
        })
        .collect();

    for gz in 0..groups[2] {
        for gy in 0..groups[1] {
            for gx in 0..groups[0] {
                // __local memory starts zeroed for each work group.
                for cell in &locals {
                    cell.borrow_mut().fill(0);
                }
                let memory = KernelMemory { args, locals: &locals };
                let group_id = [gx, gy, gz];
                for lz in 0..resolved.local[2] {
                    for ly in 0..resolved.local[1] {
                        for lx in 0..resolved.local[0] {
                            let local_id = [lx, ly, lz];
                            let mut global_id = [0; 3];
                            for d in 0..3 {
                                global_id[d] = resolved.offset[d]
                                    + group_id[d] * resolved.local[d]
                                    + local_id[d];
                            }
                            let item = WorkItem {
                                work_dim: resolved.work_dim,
                                global_id,
                                global_size: resolved.global,
                                global_offset: resolved.offset,
                                local_id,
                                local_size: resolved.local,
                                group_id,
                            };
                            (**kernel)(&item, &memory)?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
