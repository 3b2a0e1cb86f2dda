//! Host implementations of the bundled kernels.
//!
//! Each function matches the OpenCL C source of the same name in
//! [`crate::kernels`] work item for work item, so a program built from that
//! source on the host runtime behaves like it would on a device.

use crate::error::ClStatus;

use super::exec::{KernelMemory, WorkItem};

/// `vector_add(a, b, c, n)`: `c[i] = a[i] + b[i]` for `i < n`.
pub fn vector_add(item: &WorkItem, mem: &KernelMemory<'_>) -> Result<(), ClStatus> {
    let i = item.global_id(0);
    let n: i32 = mem.scalar(3)?;
    if (i as i64) < i64::from(n) {
        let a: i32 = mem.load(0, i)?;
        let b: i32 = mem.load(1, i)?;
        mem.store(2, i, a.wrapping_add(b))?;
    }
    Ok(())
}

/// `square_matrix_multiply(c, a, b, side)`: row-major `C = A * B`, one
/// output element per work item (dimension 0 = column, 1 = row).
pub fn square_matrix_multiply(item: &WorkItem, mem: &KernelMemory<'_>) -> Result<(), ClStatus> {
    let side: i32 = mem.scalar(3)?;
    let side = usize::try_from(side).map_err(|_| ClStatus::INVALID_ARG_VALUE)?;
    let col = item.global_id(0);
    let row = item.global_id(1);
    if row >= side || col >= side {
        return Ok(());
    }
    let mut acc = 0i32;
    for k in 0..side {
        let a: i32 = mem.load(1, row * side + k)?;
        let b: i32 = mem.load(2, k * side + col)?;
        acc = acc.wrapping_add(a.wrapping_mul(b));
    }
    mem.store(0, row * side + col, acc)
}
