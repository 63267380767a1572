//! Runtime configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Environment variables (runtime)
//! 2. File named by `PKIT_CONFIG_RS` (compile time)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use pkit_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env()
//!     .worker_name("copy-io")
//!     .park_timeout(Duration::from_millis(20));
//! let worker = IoWorker::with_config(&config)?;
//! ```

pub mod defaults;

use pkit_core::binstack::BinStack;
use pkit_core::env::{env_get, env_get_str};
use pkit_core::error::KitResult;
use std::time::Duration;

const MIN_STACK_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Stack size of each I/O worker thread
    pub worker_stack_size: usize,
    /// Upper bound on one idle park of the worker
    pub park_timeout: Duration,
    /// Worker thread name
    pub worker_name: String,
    /// First block size for binary stacks built by the runtime
    pub binstack_prealloc: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Compile-time defaults with environment overrides
    ///
    /// Environment variables (all optional):
    /// - `PKIT_WORKER_STACK_SIZE` - Worker thread stack size in bytes
    /// - `PKIT_WORKER_PARK_TIMEOUT_MS` - Idle park timeout in milliseconds
    /// - `PKIT_WORKER_NAME` - Worker thread name
    /// - `PKIT_BINSTACK_PREALLOC` - First binary stack block size
    pub fn from_env() -> Self {
        Self {
            worker_stack_size: env_get("PKIT_WORKER_STACK_SIZE", defaults::WORKER_STACK_SIZE),
            park_timeout: Duration::from_millis(env_get(
                "PKIT_WORKER_PARK_TIMEOUT_MS",
                defaults::WORKER_PARK_TIMEOUT_MS,
            )),
            worker_name: env_get_str("PKIT_WORKER_NAME", "pkit-io"),
            binstack_prealloc: env_get("PKIT_BINSTACK_PREALLOC", defaults::BINSTACK_PREALLOC),
        }
    }

    /// Compile-time defaults only, no environment lookups
    pub fn new() -> Self {
        Self {
            worker_stack_size: defaults::WORKER_STACK_SIZE,
            park_timeout: Duration::from_millis(defaults::WORKER_PARK_TIMEOUT_MS),
            worker_name: "pkit-io".to_string(),
            binstack_prealloc: defaults::BINSTACK_PREALLOC,
        }
    }

    // Builder methods

    pub fn worker_stack_size(mut self, size: usize) -> Self {
        self.worker_stack_size = size;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    pub fn binstack_prealloc(mut self, size: usize) -> Self {
        self.binstack_prealloc = size;
        self
    }

    /// A binary stack whose first block holds `binstack_prealloc` bytes
    pub fn binstack(&self) -> KitResult<BinStack> {
        BinStack::new(self.binstack_prealloc)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::InvalidValue("worker_stack_size must be >= 16KB"));
        }
        if self.park_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("park_timeout must be > 0"));
        }
        if self.worker_name.is_empty() || self.worker_name.contains('\0') {
            return Err(ConfigError::InvalidValue("worker_name must be non-empty without NUL"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("pkit runtime configuration:");
        eprintln!("  worker_stack_size:  {}", self.worker_stack_size);
        eprintln!("  park_timeout:       {:?}", self.park_timeout);
        eprintln!("  worker_name:        {}", self.worker_name);
        eprintln!("  binstack_prealloc:  {}", self.binstack_prealloc);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
