//! Error types for the helper layer.
//!
//! Every runtime failure is converted into a [`ClkitError`] at the call
//! site and handed back to the caller. Nothing is retried or swallowed;
//! whether a failure is fatal is the caller's decision.

use std::fmt;
use std::path::PathBuf;

use tracing::debug;

/// Native status code reported by the compute runtime (`cl_int`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClStatus(pub i32);

impl ClStatus {
    pub const SUCCESS: Self = Self(0);
    pub const DEVICE_NOT_FOUND: Self = Self(-1);
    pub const DEVICE_NOT_AVAILABLE: Self = Self(-2);
    pub const COMPILER_NOT_AVAILABLE: Self = Self(-3);
    pub const MEM_OBJECT_ALLOCATION_FAILURE: Self = Self(-4);
    pub const OUT_OF_RESOURCES: Self = Self(-5);
    pub const OUT_OF_HOST_MEMORY: Self = Self(-6);
    pub const BUILD_PROGRAM_FAILURE: Self = Self(-11);
    pub const EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST: Self = Self(-14);
    pub const INVALID_VALUE: Self = Self(-30);
    pub const INVALID_DEVICE_TYPE: Self = Self(-31);
    pub const INVALID_PLATFORM: Self = Self(-32);
    pub const INVALID_DEVICE: Self = Self(-33);
    pub const INVALID_CONTEXT: Self = Self(-34);
    pub const INVALID_QUEUE_PROPERTIES: Self = Self(-35);
    pub const INVALID_COMMAND_QUEUE: Self = Self(-36);
    pub const INVALID_HOST_PTR: Self = Self(-37);
    pub const INVALID_MEM_OBJECT: Self = Self(-38);
    pub const INVALID_BUILD_OPTIONS: Self = Self(-43);
    pub const INVALID_PROGRAM: Self = Self(-44);
    pub const INVALID_PROGRAM_EXECUTABLE: Self = Self(-45);
    pub const INVALID_KERNEL_NAME: Self = Self(-46);
    pub const INVALID_KERNEL: Self = Self(-48);
    pub const INVALID_ARG_INDEX: Self = Self(-49);
    pub const INVALID_ARG_VALUE: Self = Self(-50);
    pub const INVALID_ARG_SIZE: Self = Self(-51);
    pub const INVALID_KERNEL_ARGS: Self = Self(-52);
    pub const INVALID_WORK_DIMENSION: Self = Self(-53);
    pub const INVALID_WORK_GROUP_SIZE: Self = Self(-54);
    pub const INVALID_GLOBAL_OFFSET: Self = Self(-56);
    pub const INVALID_EVENT: Self = Self(-58);
    pub const INVALID_OPERATION: Self = Self(-59);
    pub const INVALID_BUFFER_SIZE: Self = Self(-61);
    pub const INVALID_GLOBAL_WORK_SIZE: Self = Self(-63);

    /// Raw `cl_int` value.
    pub fn code(self) -> i32 {
        self.0
    }

    /// Symbolic name of the status, when it is one the helper knows.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0 => "CL_SUCCESS",
            -1 => "CL_DEVICE_NOT_FOUND",
            -2 => "CL_DEVICE_NOT_AVAILABLE",
            -3 => "CL_COMPILER_NOT_AVAILABLE",
            -4 => "CL_MEM_OBJECT_ALLOCATION_FAILURE",
            -5 => "CL_OUT_OF_RESOURCES",
            -6 => "CL_OUT_OF_HOST_MEMORY",
            -11 => "CL_BUILD_PROGRAM_FAILURE",
            -14 => "CL_EXEC_STATUS_ERROR_FOR_EVENTS_IN_WAIT_LIST",
            -30 => "CL_INVALID_VALUE",
            -31 => "CL_INVALID_DEVICE_TYPE",
            -32 => "CL_INVALID_PLATFORM",
            -33 => "CL_INVALID_DEVICE",
            -34 => "CL_INVALID_CONTEXT",
            -35 => "CL_INVALID_QUEUE_PROPERTIES",
            -36 => "CL_INVALID_COMMAND_QUEUE",
            -37 => "CL_INVALID_HOST_PTR",
            -38 => "CL_INVALID_MEM_OBJECT",
            -43 => "CL_INVALID_BUILD_OPTIONS",
            -44 => "CL_INVALID_PROGRAM",
            -45 => "CL_INVALID_PROGRAM_EXECUTABLE",
            -46 => "CL_INVALID_KERNEL_NAME",
            -48 => "CL_INVALID_KERNEL",
            -49 => "CL_INVALID_ARG_INDEX",
            -50 => "CL_INVALID_ARG_VALUE",
            -51 => "CL_INVALID_ARG_SIZE",
            -52 => "CL_INVALID_KERNEL_ARGS",
            -53 => "CL_INVALID_WORK_DIMENSION",
            -54 => "CL_INVALID_WORK_GROUP_SIZE",
            -56 => "CL_INVALID_GLOBAL_OFFSET",
            -58 => "CL_INVALID_EVENT",
            -59 => "CL_INVALID_OPERATION",
            -61 => "CL_INVALID_BUFFER_SIZE",
            -63 => "CL_INVALID_GLOBAL_WORK_SIZE",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for ClStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({name})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<i32> for ClStatus {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

/// Errors surfaced by the helper functions.
#[derive(Debug, thiserror::Error)]
pub enum ClkitError {
    #[error("no compute platform available")]
    NoPlatformAvailable,

    #[error("context creation failed: {0}")]
    ContextCreationFailed(ClStatus),

    #[error("device query failed: {0}")]
    DeviceQueryFailed(ClStatus),

    #[error("cannot read '{}': {source}", .path.display())]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("program creation failed: {0}")]
    ProgramCreationFailed(ClStatus),

    #[error("program build failed: {0}")]
    BuildFailed(ClStatus),

    #[error("kernel '{entry_point}' not found: {code}")]
    KernelNotFound { entry_point: String, code: ClStatus },

    #[error("invalid buffer flag '{0}' (expected one of r, w, h, a, c)")]
    InvalidBufferFlag(char),

    #[error("buffer creation failed: {0}")]
    BufferCreationFailed(ClStatus),

    #[error("binding kernel argument {position} failed: {code}")]
    ArgBindFailed { position: u32, code: ClStatus },

    #[error("command queue creation failed: {0}")]
    QueueCreationFailed(ClStatus),

    #[error("kernel enqueue failed: {0}")]
    EnqueueFailed(ClStatus),

    #[error("waiting for event failed: {0}")]
    WaitFailed(ClStatus),

    #[error("buffer readback failed: {0}")]
    ReadbackFailed(ClStatus),

    #[error("buffer write failed: {0}")]
    WriteFailed(ClStatus),
}

impl ClkitError {
    /// Native runtime status carried by this error, if any.
    pub fn status(&self) -> Option<ClStatus> {
        match self {
            Self::NoPlatformAvailable | Self::FileNotFound { .. } | Self::InvalidBufferFlag(_) => {
                None
            }
            Self::ContextCreationFailed(code)
            | Self::DeviceQueryFailed(code)
            | Self::ProgramCreationFailed(code)
            | Self::BuildFailed(code)
            | Self::QueueCreationFailed(code)
            | Self::BufferCreationFailed(code)
            | Self::EnqueueFailed(code)
            | Self::WaitFailed(code)
            | Self::ReadbackFailed(code)
            | Self::WriteFailed(code) => Some(*code),
            Self::KernelNotFound { code, .. } | Self::ArgBindFailed { code, .. } => Some(*code),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClkitError>;

/// Lifts a raw runtime result into the helper's error taxonomy.
pub(crate) trait StatusExt<T> {
    fn or_fail(self, wrap: impl FnOnce(ClStatus) -> ClkitError) -> Result<T>;
}

impl<T> StatusExt<T> for std::result::Result<T, ClStatus> {
    fn or_fail(self, wrap: impl FnOnce(ClStatus) -> ClkitError) -> Result<T> {
        self.map_err(|code| {
            let err = wrap(code);
            debug!(error = %err, "runtime call failed");
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_includes_symbolic_name() {
        assert_eq!(ClStatus::BUILD_PROGRAM_FAILURE.to_string(), "-11 (CL_BUILD_PROGRAM_FAILURE)");
        assert_eq!(ClStatus(-1234).to_string(), "-1234");
    }

    #[test]
    fn only_runtime_failures_carry_a_status() {
        assert_eq!(ClkitError::NoPlatformAvailable.status(), None);
        assert_eq!(ClkitError::InvalidBufferFlag('x').status(), None);
        let err = ClkitError::ArgBindFailed { position: 2, code: ClStatus::INVALID_ARG_SIZE };
        assert_eq!(err.status(), Some(ClStatus::INVALID_ARG_SIZE));
    }

    #[test]
    fn error_messages_name_the_failure() {
        let err = ClkitError::KernelNotFound {
            entry_point: "vector_add".into(),
            code: ClStatus::INVALID_KERNEL_NAME,
        };
        let msg = err.to_string();
        assert!(msg.contains("vector_add"), "{msg}");
        assert!(msg.contains("CL_INVALID_KERNEL_NAME"), "{msg}");
    }

    #[test]
    fn or_fail_wraps_the_code() {
        let raw: std::result::Result<(), ClStatus> = Err(ClStatus::INVALID_HOST_PTR);
        let err = raw.or_fail(ClkitError::BufferCreationFailed).unwrap_err();
        assert!(matches!(err, ClkitError::BufferCreationFailed(ClStatus::INVALID_HOST_PTR)));
    }
}
