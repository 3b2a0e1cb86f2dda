//! Session configuration with TOML, environment variable and default
//! sources.

use std::path::{Path, PathBuf};
use std::{env, fmt, fs};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::runtime::{DeviceType, QueueProperties, UnknownDeviceType};

// ── Errors ──────────────────────────────────────────────────────────

/// Errors produced by configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error(transparent)]
    UnknownDeviceType(#[from] UnknownDeviceType),

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid environment variable value for {key}: {value}")]
    InvalidEnvVar { key: String, value: String },
}

// ── Backend ─────────────────────────────────────────────────────────

/// Which [`Runtime`](crate::runtime::Runtime) a session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// The in-process reference runtime.
    #[serde(alias = "cpu")]
    Host,
    /// The system OpenCL runtime (requires the `opencl` feature).
    #[serde(alias = "OpenCL")]
    OpenCl,
}

impl Backend {
    /// Whether this build can run the backend.
    pub fn is_available(self) -> bool {
        match self {
            Self::Host => true,
            Self::OpenCl => cfg!(feature = "opencl"),
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        if cfg!(feature = "opencl") { Self::OpenCl } else { Self::Host }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::OpenCl => write!(f, "opencl"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" | "cpu" => Ok(Self::Host),
            "opencl" => Ok(Self::OpenCl),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

// ── LogLevel ────────────────────────────────────────────────────────

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
    }
}

// ── TOML wrapper ────────────────────────────────────────────────────

/// Wrapper used for the `[clkit]` table in TOML files.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TomlWrapper {
    clkit: ClkitConfig,
}

// ── ClkitConfig ─────────────────────────────────────────────────────

/// Runtime and device selection for a compute session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClkitConfig {
    pub backend: Backend,
    pub platform_index: usize,
    pub device_type: DeviceType,
    pub device_index: usize,
    pub build_options: String,
    pub out_of_order: bool,
    pub profiling: bool,
    pub kernel_dir: Option<PathBuf>,
    pub log_level: LogLevel,
}

impl Default for ClkitConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            platform_index: 0,
            device_type: DeviceType::ALL,
            device_index: 0,
            build_options: String::new(),
            out_of_order: false,
            profiling: false,
            kernel_dir: None,
            log_level: LogLevel::Warn,
        }
    }
}

impl ClkitConfig {
    // ── Constructors ────────────────────────────────────────────

    /// Load configuration from a TOML file at `path`.
    ///
    /// The file is expected to contain a `[clkit]` table. If the file does
    /// not exist, returns `Ok(Self::default())`.
    pub fn from_toml(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!("config file not found: {}; using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let wrapper: TomlWrapper = toml::from_str(&text)?;
        Ok(wrapper.clkit)
    }

    /// Serialize to a TOML string (wrapped in `[clkit]`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let wrapper = TomlWrapper { clkit: self.clone() };
        Ok(toml::to_string_pretty(&wrapper)?)
    }

    /// Build a config from `CLKIT_*` environment variables on top of
    /// `Self::default()`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("CLKIT_BACKEND") {
            cfg.backend = v.parse()?;
        }
        if let Ok(v) = env::var("CLKIT_PLATFORM_INDEX") {
            cfg.platform_index = Self::parse_env_usize("CLKIT_PLATFORM_INDEX", &v)?;
        }
        if let Ok(v) = env::var("CLKIT_DEVICE_TYPE") {
            cfg.device_type = v.parse()?;
        }
        if let Ok(v) = env::var("CLKIT_DEVICE_INDEX") {
            cfg.device_index = Self::parse_env_usize("CLKIT_DEVICE_INDEX", &v)?;
        }
        if let Ok(v) = env::var("CLKIT_BUILD_OPTIONS") {
            cfg.build_options = v;
        }
        if let Ok(v) = env::var("CLKIT_OUT_OF_ORDER") {
            cfg.out_of_order = Self::parse_env_bool("CLKIT_OUT_OF_ORDER", &v)?;
        }
        if let Ok(v) = env::var("CLKIT_PROFILING") {
            cfg.profiling = Self::parse_env_bool("CLKIT_PROFILING", &v)?;
        }
        if let Ok(v) = env::var("CLKIT_KERNEL_DIR") {
            cfg.kernel_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = env::var("CLKIT_LOG_LEVEL") {
            cfg.log_level = v.parse()?;
        }

        Ok(cfg)
    }

    // ── Validation ──────────────────────────────────────────────

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backend.is_available() {
            return Err(ConfigError::Validation(format!(
                "backend '{}' is not compiled in (enable the `opencl` feature)",
                self.backend
            )));
        }
        if self.build_options.contains('\0') {
            return Err(ConfigError::Validation("build_options must not contain NUL".into()));
        }
        if let Some(dir) = &self.kernel_dir {
            if !dir.is_dir() {
                return Err(ConfigError::Validation(format!(
                    "kernel_dir '{}' is not a directory",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    // ── Merge ───────────────────────────────────────────────────

    /// Overlay `other` on top of `self`. Fields in `other` that differ
    /// from the default take precedence.
    #[must_use]
    pub fn merge_with(&self, other: &Self) -> Self {
        let d = Self::default();
        Self {
            backend: if other.backend == d.backend { self.backend } else { other.backend },
            platform_index: if other.platform_index == d.platform_index {
                self.platform_index
            } else {
                other.platform_index
            },
            device_type: if other.device_type == d.device_type {
                self.device_type
            } else {
                other.device_type
            },
            device_index: if other.device_index == d.device_index {
                self.device_index
            } else {
                other.device_index
            },
            build_options: if other.build_options == d.build_options {
                self.build_options.clone()
            } else {
                other.build_options.clone()
            },
            out_of_order: if other.out_of_order == d.out_of_order {
                self.out_of_order
            } else {
                other.out_of_order
            },
            profiling: if other.profiling == d.profiling {
                self.profiling
            } else {
                other.profiling
            },
            kernel_dir: other.kernel_dir.clone().or_else(|| self.kernel_dir.clone()),
            log_level: if other.log_level == d.log_level {
                self.log_level
            } else {
                other.log_level
            },
        }
    }

    /// Queue properties implied by `out_of_order` and `profiling`.
    pub fn queue_properties(&self) -> QueueProperties {
        let mut props = QueueProperties::empty();
        if self.out_of_order {
            props = props | QueueProperties::OUT_OF_ORDER_EXEC_MODE_ENABLE;
        }
        if self.profiling {
            props = props | QueueProperties::PROFILING_ENABLE;
        }
        props
    }

    // ── Helpers ─────────────────────────────────────────────────

    fn parse_env_usize(key: &str, val: &str) -> Result<usize, ConfigError> {
        val.parse::<usize>().map_err(|_| ConfigError::InvalidEnvVar {
            key: key.to_string(),
            value: val.to_string(),
        })
    }

    fn parse_env_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
        match val.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidEnvVar { key: key.to_string(), value: val.to_string() }),
        }
    }
}
