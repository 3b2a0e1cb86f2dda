//! Kernels and positional argument binding.
//!
//! [`set_kernel_args`] binds a heterogeneous argument pack to consecutive
//! parameter positions starting at 0:
//!
//! ```
//! use clkit::{HostRuntime, create_default_context, get_devices, create_program, build_program,
//!             load_kernel, create_buffer, set_kernel_args, SourceUnit, kernels};
//!
//! # fn main() -> clkit::Result<()> {
//! let rt = HostRuntime::new();
//! let ctx = create_default_context(&rt)?;
//! let devices = get_devices(&ctx)?;
//! let mut program = create_program(&ctx, &[SourceUnit::from(kernels::VECTOR_ADD_SOURCE)])?;
//! build_program(&mut program, &devices, "")?;
//! let mut kernel = load_kernel(&program, "vector_add")?;
//!
//! let a = create_buffer(&ctx, "r", 64, None)?;
//! let b = create_buffer(&ctx, "r", 64, None)?;
//! let c = create_buffer(&ctx, "w", 64, None)?;
//! set_kernel_args(&mut kernel, (&a, &b, &c, 16i32))?;
//! assert!(kernel.is_fully_bound());
//! # Ok(())
//! # }
//! ```
//!
//! Binding stops at the first argument the runtime rejects. Positions bound
//! before it stay bound; nothing after it is attempted.

use std::fmt;

use bytemuck::Pod;
use tracing::trace;

use crate::buffer::Buffer;
use crate::error::{ClkitError, Result, StatusExt};
use crate::program::Program;
use crate::runtime::{ArgValue, Runtime};

/// A kernel entry point resolved from a built program.
pub struct Kernel<'a, R: Runtime> {
    program: &'a Program<'a, R>,
    raw: R::Kernel,
    name: String,
    bound: Vec<bool>,
}

impl<'a, R: Runtime> Kernel<'a, R> {
    pub(crate) fn new(program: &'a Program<'a, R>, raw: R::Kernel, name: &str, arity: u32) -> Self {
        Self { program, raw, name: name.to_string(), bound: vec![false; arity as usize] }
    }

    pub fn program(&self) -> &'a Program<'a, R> {
        self.program
    }

    pub fn raw(&self) -> &R::Kernel {
        &self.raw
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of parameters the kernel declares.
    pub fn arity(&self) -> u32 {
        self.bound.len() as u32
    }

    pub fn is_bound(&self, index: u32) -> bool {
        self.bound.get(index as usize).copied().unwrap_or(false)
    }

    pub fn is_fully_bound(&self) -> bool {
        self.bound.iter().all(|&b| b)
    }

    /// Lowest parameter position without a value.
    pub fn first_unbound(&self) -> Option<u32> {
        self.bound.iter().position(|&b| !b).map(|i| i as u32)
    }

    /// Bind a single argument at `index`.
    pub fn set_arg<A: KernelArg<R> + ?Sized>(&mut self, index: u32, arg: &A) -> Result<()> {
        let rt = self.program.context().runtime();
        rt.set_kernel_arg(&mut self.raw, index, arg.as_arg())
            .or_fail(|code| ClkitError::ArgBindFailed { position: index, code })?;
        if let Some(slot) = self.bound.get_mut(index as usize) {
            *slot = true;
        }
        trace!(kernel = %self.name, index, "argument bound");
        Ok(())
    }
}

impl<R: Runtime> fmt::Debug for Kernel<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name)
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

/// A value that can be bound to one kernel parameter.
pub trait KernelArg<R: Runtime> {
    fn as_arg(&self) -> ArgValue<'_, R::Buffer>;
}

impl<R: Runtime> KernelArg<R> for Buffer<'_, R> {
    fn as_arg(&self) -> ArgValue<'_, R::Buffer> {
        ArgValue::Buffer(self.raw())
    }
}

impl<R: Runtime, A: KernelArg<R> + ?Sized> KernelArg<R> for &A {
    fn as_arg(&self) -> ArgValue<'_, R::Buffer> {
        (**self).as_arg()
    }
}

macro_rules! scalar_arg {
    ($($t:ty),* $(,)?) => {
        $(
            impl<R: Runtime> KernelArg<R> for $t {
                fn as_arg(&self) -> ArgValue<'_, R::Buffer> {
                    ArgValue::Bytes(bytemuck::bytes_of(self))
                }
            }
        )*
    };
}

scalar_arg!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

/// Fixed-size arrays bind as OpenCL vector types (`int4`, `float2`, ...).
impl<R: Runtime, T: Pod, const N: usize> KernelArg<R> for [T; N] {
    fn as_arg(&self) -> ArgValue<'_, R::Buffer> {
        ArgValue::Bytes(bytemuck::cast_slice(self.as_slice()))
    }
}

/// Size in bytes of a `__local` parameter's allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalMemory(pub usize);

impl LocalMemory {
    /// Room for `count` elements of `T`.
    pub fn of<T>(count: usize) -> Self {
        Self(count * std::mem::size_of::<T>())
    }
}

impl<R: Runtime> KernelArg<R> for LocalMemory {
    fn as_arg(&self) -> ArgValue<'_, R::Buffer> {
        ArgValue::Local(self.0)
    }
}

/// An argument pack bound to positions `0..len` in order.
pub trait KernelArgs<R: Runtime> {
    fn bind(&self, kernel: &mut Kernel<'_, R>) -> Result<()>;
}

impl<R: Runtime> KernelArgs<R> for () {
    fn bind(&self, _kernel: &mut Kernel<'_, R>) -> Result<()> {
        Ok(())
    }
}

impl<R: Runtime> KernelArgs<R> for &[&dyn KernelArg<R>] {
    fn bind(&self, kernel: &mut Kernel<'_, R>) -> Result<()> {
        for (index, arg) in self.iter().enumerate() {
            kernel.set_arg(index as u32, *arg)?;
        }
        Ok(())
    }
}

macro_rules! tuple_args {
    ($($name:ident $idx:tt),+) => {
        impl<R: Runtime, $($name: KernelArg<R>),+> KernelArgs<R> for ($($name,)+) {
            fn bind(&self, kernel: &mut Kernel<'_, R>) -> Result<()> {
                $(kernel.set_arg($idx, &self.$idx)?;)+
                Ok(())
            }
        }
    };
}

tuple_args!(A0 0);
tuple_args!(A0 0, A1 1);
tuple_args!(A0 0, A1 1, A2 2);
tuple_args!(A0 0, A1 1, A2 2, A3 3);
tuple_args!(A0 0, A1 1, A2 2, A3 3, A4 4);
tuple_args!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5);
tuple_args!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6);
tuple_args!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7);
tuple_args!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7, A8 8);
tuple_args!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7, A8 8, A9 9);
tuple_args!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7, A8 8, A9 9, A10 10);
tuple_args!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7, A8 8, A9 9, A10 10, A11 11);
tuple_args!(A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7, A8 8, A9 9, A10 10, A11 11, A12 12);
tuple_args!(
    A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7, A8 8, A9 9, A10 10, A11 11, A12 12, A13 13
);
tuple_args!(
    A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7, A8 8, A9 9, A10 10, A11 11, A12 12, A13 13,
    A14 14
);
tuple_args!(
    A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7, A8 8, A9 9, A10 10, A11 11, A12 12, A13 13,
    A14 14, A15 15
);

/// Bind `args` to `kernel`, argument *i* to parameter *i*.
///
/// Fails with [`ClkitError::ArgBindFailed`] naming the first rejected
/// position. Earlier positions remain bound.
pub fn set_kernel_args<R: Runtime, A: KernelArgs<R>>(
    kernel: &mut Kernel<'_, R>,
    args: A,
) -> Result<()> {
    args.bind(kernel)
}
