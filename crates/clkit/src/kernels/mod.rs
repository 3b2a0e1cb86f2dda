//! Bundled OpenCL C kernel sources.
//!
//! Sources are embedded at compile time via `include_str!`. The same files
//! are what [`crate::load_and_build_program`] reads from disk, and
//! [`crate::runtime::host::reference`] carries a host implementation of
//! each entry point.

/// `vector_add(a, b, c, n)`: `c[i] = a[i] + b[i]` over `int` vectors.
pub const VECTOR_ADD_SOURCE: &str = include_str!("vector_add.cl");

/// `square_matrix_multiply(c, a, b, side)`: row-major `int` matrix product.
pub const MATRIX_MULTIPLY_SOURCE: &str = include_str!("matrix_multiply.cl");

/// File names of the bundled sources, relative to a kernel directory.
pub const VECTOR_ADD_FILE: &str = "vector_add.cl";
pub const MATRIX_MULTIPLY_FILE: &str = "matrix_multiply.cl";
