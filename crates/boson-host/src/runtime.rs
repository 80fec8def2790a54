//! A running engine instance.
//!
//! [`WasmRuntime`] owns one Wasmtime store and instance. Each
//! [`step`](WasmRuntime::step) resets the fuel budget, publishes the frame
//! metadata to the guest through [`HostState`], and awaits the guest's
//! `step()` export.

use wasmtime::{Instance, Store, TypedFunc};

use crate::host_api::HostState;
use crate::module::EngineConfig;
use crate::WasmError;

/// One instantiated engine, produced by [`WasmEngine::start`](crate::WasmEngine::start).
///
/// Not `Clone`: the guest state lives in the store and is only mutated by
/// [`step`](Self::step).
pub struct WasmRuntime {
    store: Store<HostState>,
    instance: Instance,
    step_fn: TypedFunc<(), ()>,
    config: EngineConfig,
    steps_completed: u64,
}

impl WasmRuntime {
    pub(crate) fn new(
        mut store: Store<HostState>,
        instance: Instance,
        config: EngineConfig,
    ) -> Result<Self, WasmError> {
        let step_fn = instance
            .get_typed_func::<(), ()>(&mut store, &config.step_export)
            .map_err(|e| {
                WasmError::Runtime(format!("failed to resolve {}(): {e}", config.step_export))
            })?;

        Ok(Self {
            store,
            instance,
            step_fn,
            config,
            steps_completed: 0,
        })
    }

    /// Advance the engine by one step.
    ///
    /// `frame`, `sim_time` and `delta_time` are exposed to the guest through
    /// the `"boson"` host API for the duration of the call. Returns the amount
    /// of fuel consumed.
    ///
    /// # Errors
    ///
    /// - [`WasmError::OutOfFuel`] if the step exhausts [`EngineConfig::fuel_per_step`].
    /// - [`WasmError::Trap`] if a WASM trap occurs (e.g. unreachable).
    /// - [`WasmError::Runtime`] if fuel bookkeeping fails.
    pub async fn step(
        &mut self,
        frame: u64,
        sim_time: f64,
        delta_time: f64,
    ) -> Result<u64, WasmError> {
        self.store.data_mut().begin_step(frame, sim_time, delta_time);
        self.reset_fuel()?;

        self.step_fn
            .call_async(&mut self.store, ())
            .await
            .map_err(|e| classify_trap(e, self.config.fuel_per_step))?;

        let remaining = self
            .store
            .get_fuel()
            .map_err(|e| WasmError::Runtime(format!("failed to read fuel: {e}")))?;
        let consumed = self.config.fuel_per_step.saturating_sub(remaining);
        self.steps_completed += 1;

        tracing::trace!(
            frame,
            fuel_consumed = consumed,
            fuel_remaining = remaining,
            "step() completed"
        );

        Ok(consumed)
    }

    /// Call a named export that takes no arguments and returns an `i32`.
    ///
    /// Diagnostic helper for reading guest state. Fuel is NOT reset before
    /// this call.
    ///
    /// # Errors
    ///
    /// - [`WasmError::Runtime`] if the export does not exist or has wrong signature.
    /// - [`WasmError::Trap`] or [`WasmError::OutOfFuel`] on execution failure.
    pub async fn call_i32_export(&mut self, name: &str) -> Result<i32, WasmError> {
        let func = self
            .instance
            .get_typed_func::<(), i32>(&mut self.store, name)
            .map_err(|e| WasmError::Runtime(format!("failed to resolve export '{name}': {e}")))?;

        func.call_async(&mut self.store, ())
            .await
            .map_err(|e| classify_trap(e, self.config.fuel_per_step))
    }

    /// Call a named export that takes no arguments and returns an `i64`.
    ///
    /// # Errors
    ///
    /// Same as [`call_i32_export`](Self::call_i32_export).
    pub async fn call_i64_export(&mut self, name: &str) -> Result<i64, WasmError> {
        let func = self
            .instance
            .get_typed_func::<(), i64>(&mut self.store, name)
            .map_err(|e| WasmError::Runtime(format!("failed to resolve export '{name}': {e}")))?;

        func.call_async(&mut self.store, ())
            .await
            .map_err(|e| classify_trap(e, self.config.fuel_per_step))
    }

    /// Number of steps that completed without error.
    pub fn steps_completed(&self) -> u64 {
        self.steps_completed
    }

    /// Returns the amount of fuel remaining in the store.
    pub fn fuel_remaining(&self) -> u64 {
        self.store.get_fuel().unwrap_or(0)
    }

    /// Returns the configuration of the engine this runtime was started from.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only access to the per-store host state.
    pub fn host_state(&self) -> &HostState {
        self.store.data()
    }

    fn reset_fuel(&mut self) -> Result<(), WasmError> {
        self.store
            .set_fuel(self.config.fuel_per_step)
            .map_err(|e| WasmError::Runtime(format!("failed to set fuel: {e}")))
    }
}

impl std::fmt::Debug for WasmRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmRuntime")
            .field("config", &self.config)
            .field("steps_completed", &self.steps_completed)
            .field("fuel_remaining", &self.fuel_remaining())
            .finish_non_exhaustive()
    }
}

/// Classify a Wasmtime error into the appropriate [`WasmError`] variant.
pub(crate) fn classify_trap(error: anyhow::Error, budget: u64) -> WasmError {
    // The trap may be the error itself or sit further down the chain.
    for cause in error.chain() {
        if let Some(trap) = cause.downcast_ref::<wasmtime::Trap>() {
            if *trap == wasmtime::Trap::OutOfFuel {
                return WasmError::OutOfFuel { budget };
            }
            return WasmError::Trap(format!("{error}"));
        }
    }

    WasmError::Runtime(format!("{error}"))
}
