// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Configuration types and parsing for the logging core.
//!
//! JSON5 configuration format supporting:
//! - Queue capacity and ring depth
//! - Output file path and minimum level
//! - Ring backend selection and diagnostics target
//! - Comments and trailing commas
//!
//! ```json5
//! {
//!     queue_capacity: 1024,
//!     ring_depth: 8,
//!     output_path: "/var/log/app/out.log",
//!     min_level: "info",
//!     backend: "auto",      // "io_uring" | "blocking"
//!     diagnostics: "stderr", // "silent"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::logging::Severity;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_RING_DEPTH: u32 = 8;
pub const DEFAULT_OUTPUT_PATH: &str = "out.log";

/// Log facade configuration (JSON5 file format)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Maximum number of rendered records buffered between producers and the writer
    pub queue_capacity: usize,

    /// Submission ring depth; half of it is the flush batch size
    pub ring_depth: u32,

    /// File receiving the rendered records
    pub output_path: PathBuf,

    /// Records less severe than this are discarded before rendering
    pub min_level: Severity,

    pub backend: RingBackend,

    /// Where internal diagnostics (I/O failures, drops) are reported
    pub diagnostics: DiagnosticsTarget,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ring_depth: DEFAULT_RING_DEPTH,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            min_level: Severity::Debug,
            backend: RingBackend::Auto,
            diagnostics: DiagnosticsTarget::Stderr,
        }
    }
}

/// Kernel I/O backend used by the writer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RingBackend {
    /// io_uring, falling back to blocking writes if ring setup is refused
    #[default]
    Auto,
    IoUring,
    /// Synchronous `pwrite` behind the same submission interface
    Blocking,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticsTarget {
    /// One JSON object per line on stderr
    #[default]
    Stderr,
    Silent,
}

impl LogConfig {
    /// Config with `output_path` replaced, everything else default.
    pub fn with_output(path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: path.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON5 file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Serialize configuration to JSON5 string (with pretty formatting)
    pub fn to_json5(&self) -> String {
        // Plain JSON is valid JSON5; json5 has no pretty printer.
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Save configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5();
        std::fs::write(path, content)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.ring_depth == 0 {
            return Err(ConfigError::InvalidRingDepth(self.ring_depth));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputPath);
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    IoError(PathBuf, String),
    ParseError(String),
    ZeroCapacity,
    InvalidRingDepth(u32),
    EmptyOutputPath,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, msg) => {
                write!(
                    f,
                    "failed to access config file '{}': {}",
                    path.display(),
                    msg
                )
            }
            ConfigError::ParseError(msg) => write!(f, "failed to parse config: {}", msg),
            ConfigError::ZeroCapacity => write!(f, "queue_capacity must be greater than 0"),
            ConfigError::InvalidRingDepth(depth) => {
                write!(f, "invalid ring_depth {}: must be greater than 0", depth)
            }
            ConfigError::EmptyOutputPath => write!(f, "output_path must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}
