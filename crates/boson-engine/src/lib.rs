//! Boson Engine -- bootstrap an externally compiled engine module and drive it
//! one step per host frame.
//!
//! The engine itself is opaque: this crate only knows how to load it
//! ([`ModuleLoader`](lifecycle::ModuleLoader)), start it
//! ([`EngineModule`](lifecycle::EngineModule)) and advance it
//! ([`RuntimeHandle`](lifecycle::RuntimeHandle)). The
//! [`FrameDriver`](driver::FrameDriver) paces those steps against a
//! [`HostClock`](clock::HostClock), keeping exactly one frame registration
//! outstanding and never overlapping two steps.
//!
//! # Quick Start
//!
//! ```no_run
//! use boson_engine::prelude::*;
//!
//! # async fn demo() -> Result<(), RunError> {
//! let loader = WasmLoader::from_path("engine.wasm", EngineConfig::default());
//! let report = boson_engine::run(&loader, IntervalClock::new(60.0), DriverConfig::default()).await?;
//! println!("stopped after {} steps", report.stats.steps_completed);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod clock;
pub mod driver;
pub mod error;
pub mod lifecycle;
pub mod wasm;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the WASM host crate for convenience.
pub use boson_host;

pub use lifecycle::{bootstrap, launch, run};

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use boson_host::{EngineConfig, WasmEngine, WasmError, WasmRuntime};

    pub use crate::clock::{
        FrameTick, HostClock, IntervalClock, ManualClock, ManualClockController,
        DEFAULT_FRAME_DELTA,
    };
    pub use crate::driver::{
        DriverConfig, DriverExit, DriverReport, DriverState, DriverStats, FrameDriver,
        StepPolicy, StopHandle,
    };
    pub use crate::error::{
        DriverError, InitializationError, RunError, StartupError, StepError,
    };
    pub use crate::lifecycle::{EngineModule, ModuleLoader, RuntimeHandle, RuntimeOf};
    pub use crate::wasm::{ModuleSource, WasmLoader};
}
