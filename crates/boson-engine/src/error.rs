//! Error taxonomy for the engine lifecycle.
//!
//! Loading ([`InitializationError`]) and starting ([`StartupError`]) are fatal
//! and never retried. A failed step ([`StepError`]) is routed through the
//! driver's [`StepPolicy`](crate::driver::StepPolicy); only when the policy
//! gives up does it become a [`DriverError`].

use std::path::PathBuf;
use std::time::Duration;

use boson_host::WasmError;

/// The engine module could not be loaded or instantiated.
#[derive(Debug, thiserror::Error)]
pub enum InitializationError {
    /// The module file could not be read.
    #[error("failed to read engine module from {}: {source}", path.display())]
    Read {
        /// Location the loader tried to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The WASM host rejected the module.
    #[error("engine module failed to load: {0}")]
    Wasm(#[from] WasmError),

    /// Any other loader failure.
    #[error("engine module failed to load: {0}")]
    Message(String),
}

/// A runtime handle could not be constructed from a loaded module.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The WASM host failed to instantiate or run `start()`.
    #[error("engine startup failed: {0}")]
    Wasm(#[from] WasmError),

    /// Any other startup failure.
    #[error("engine startup failed: {0}")]
    Message(String),
}

/// A single step failed.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// The guest trapped, ran out of fuel, or the host call failed.
    #[error("step failed: {0}")]
    Wasm(#[from] WasmError),

    /// The step did not resolve within the configured timeout.
    #[error("step did not complete within {timeout:?}")]
    TimedOut {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// Any other step failure.
    #[error("step failed: {0}")]
    Message(String),
}

/// The frame driver stopped because its step policy gave up.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// A step failed under [`StepPolicy::Abort`](crate::driver::StepPolicy::Abort).
    #[error("frame {frame}: {source}")]
    Step {
        /// Host frame index of the failing step.
        frame: u64,
        /// The step failure.
        #[source]
        source: StepError,
    },

    /// Every retry of a step failed.
    #[error("frame {frame}: step failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Host frame index of the failing step.
        frame: u64,
        /// Total attempts made, including the first.
        attempts: u32,
        /// The last step failure.
        #[source]
        source: StepError,
    },

    /// Too many consecutive frames were skipped.
    #[error("{consecutive} consecutive steps failed: {source}")]
    TooManySkipped {
        /// Length of the failure streak.
        consecutive: u32,
        /// The last step failure.
        #[source]
        source: StepError,
    },
}

/// Any error that can end a top-level [`run`](crate::run).
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Loading the module failed.
    #[error(transparent)]
    Initialization(#[from] InitializationError),

    /// Starting the runtime failed.
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// The frame driver gave up.
    #[error(transparent)]
    Driver(#[from] DriverError),
}
