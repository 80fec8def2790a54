//! Boson WASM Host -- Wasmtime integration for the externally compiled engine.
//!
//! The Boson engine ships as a WebAssembly module built outside this
//! workspace. This crate loads that module once, validates its exports, and
//! hands out independent runtimes that advance the engine one step at a time.
//! All guest execution is asynchronous: the store is configured for async
//! support and fuel metering, so a long step periodically yields back to the
//! executor instead of pinning the thread.
//!
//! # Architecture
//!
//! - **`EngineConfig`**: Fuel budgets, yield interval, memory limit and the
//!   names of the `start`/`step` exports.
//! - **`WasmEngine`**: The loaded engine module. Compiled and pre-linked once,
//!   immutable afterwards; [`WasmEngine::start`] produces runtimes.
//! - **`WasmRuntime`**: One instantiated engine. [`WasmRuntime::step`] runs the
//!   guest's `step()` export.
//! - **`HostState`**: Data held inside each Wasmtime store (frame metadata,
//!   counters, resource limits).
//! - **`WasmError`**: Error type covering compilation, missing exports, link
//!   failures, fuel exhaustion, and runtime traps.
//!
//! # Guest ABI
//!
//! A module must export `step: () -> ()`. It may export `start: () -> ()`,
//! which runs once per runtime before the first step. Guests may import the
//! functions of the `"boson"` namespace described in [`host_api`].
//!
//! # Example
//!
//! ```no_run
//! use boson_host::{EngineConfig, WasmEngine};
//!
//! # async fn demo() -> Result<(), boson_host::WasmError> {
//! let config = EngineConfig::default();
//! let wat = r#"(module (func (export "step") nop))"#;
//! let engine = WasmEngine::from_bytes(&config, wat.as_bytes())?;
//! let mut runtime = engine.start().await?;
//! let fuel_consumed = runtime.step(0, 0.0, 1.0 / 60.0).await?;
//! assert!(fuel_consumed > 0);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod host_api;
mod module;
mod runtime;

pub use host_api::HostState;
pub use module::{EngineConfig, WasmEngine};
pub use runtime::WasmRuntime;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by WASM engine operations.
#[derive(Debug, thiserror::Error)]
pub enum WasmError {
    /// The WASM binary could not be compiled (invalid bytecode or WAT syntax).
    #[error("WASM compilation failed: {0}")]
    CompileError(String),

    /// The module does not export a required function (e.g. `step()`).
    #[error("missing required export '{name}' -- the engine module must export a `{name}()` function")]
    MissingExport {
        /// The name of the missing export.
        name: String,
    },

    /// An export exists but is not a function of the expected type.
    #[error("export '{name}' has the wrong type, expected {expected}")]
    SignatureMismatch {
        /// The name of the offending export.
        name: String,
        /// Human-readable description of the expected signature.
        expected: String,
    },

    /// The module imports something the host does not provide (e.g. WASI).
    #[error("WASM link failed: {0}")]
    Link(String),

    /// Creating an instance failed, typically because a resource limit was
    /// hit (memory minimum above the configured limit).
    #[error("WASM instantiation failed: {0}")]
    Instantiate(String),

    /// The guest exhausted its fuel budget during execution.
    #[error("WASM module ran out of fuel (budget: {budget} units) -- possible infinite loop or excessive computation")]
    OutOfFuel {
        /// The fuel budget that was exceeded.
        budget: u64,
    },

    /// A WASM trap occurred during execution (e.g. unreachable instruction,
    /// division by zero, out-of-bounds memory access).
    #[error("WASM trap: {0}")]
    Trap(String),

    /// A general runtime error from the Wasmtime engine.
    #[error("WASM runtime error: {0}")]
    Runtime(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Host API tests
// ---------------------------------------------------------------------------
