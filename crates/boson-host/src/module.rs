//! Engine module loading and validation.
//!
//! [`WasmEngine`] compiles the engine binary once, checks the `step()` and
//! optional `start()` exports, and pre-links the host API so every later
//! [`start`](WasmEngine::start) only has to create a store and instantiate.

use wasmtime::{Engine, ExternType, FuncType, InstancePre, Linker, Module, Store, StoreLimitsBuilder};

use crate::host_api::{register_host_api, HostState};
use crate::runtime::{classify_trap, WasmRuntime};
use crate::WasmError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the WASM sandbox the engine runs in.
///
/// Controls fuel budgets (execution limits per step and for startup), how
/// often a running guest yields to the async executor, the memory cap, and
/// the names of the exports the host calls.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fuel units granted per `step()` call. When fuel runs out, execution
    /// traps with [`WasmError::OutOfFuel`]. Default: 1,000,000.
    pub fuel_per_step: u64,

    /// Fuel units granted to the `start()` export. Default: 10,000,000.
    pub startup_fuel: u64,

    /// Yield to the executor after this many fuel units. `None` disables
    /// yielding, so a step runs to completion in a single poll.
    /// Default: `Some(10_000)`.
    pub fuel_yield_interval: Option<u64>,

    /// Maximum linear memory a runtime may allocate, in bytes.
    /// Default: 16 MiB (16,777,216 bytes).
    pub memory_limit_bytes: usize,

    /// Name of the export advancing the engine by one step.
    pub step_export: String,

    /// Name of the optional export run once per runtime before stepping.
    pub start_export: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuel_per_step: 1_000_000,
            startup_fuel: 10_000_000,
            fuel_yield_interval: Some(10_000),
            memory_limit_bytes: 16 * 1024 * 1024, // 16 MiB
            step_export: "step".to_owned(),
            start_export: "start".to_owned(),
        }
    }
}

// ---------------------------------------------------------------------------
// WasmEngine
// ---------------------------------------------------------------------------

/// A compiled and validated engine module.
///
/// Immutable after [`from_bytes`](WasmEngine::from_bytes). Each call to
/// [`start`](WasmEngine::start) creates a fresh store and instance, so
/// runtimes started from the same engine never share guest state.
pub struct WasmEngine {
    engine: Engine,
    instance_pre: InstancePre<HostState>,
    has_start: bool,
    config: EngineConfig,
}

impl WasmEngine {
    /// Compile, validate and pre-link an engine module from raw bytes.
    ///
    /// The bytes may be either a binary `.wasm` file or a text `.wat` file
    /// (Wasmtime handles both transparently).
    ///
    /// # Errors
    ///
    /// - [`WasmError::CompileError`] if the bytes are not valid WASM/WAT.
    /// - [`WasmError::MissingExport`] if the step export is absent.
    /// - [`WasmError::SignatureMismatch`] if `step` or `start` is not `() -> ()`.
    /// - [`WasmError::Link`] if the module imports anything outside the
    ///   `"boson"` host API.
    pub fn from_bytes(config: &EngineConfig, bytes: &[u8]) -> Result<Self, WasmError> {
        let mut engine_config = wasmtime::Config::new();
        engine_config.async_support(true);
        engine_config.consume_fuel(true);

        let engine = Engine::new(&engine_config)
            .map_err(|e| WasmError::Runtime(format!("failed to create Wasmtime engine: {e}")))?;

        let module =
            Module::new(&engine, bytes).map_err(|e| WasmError::CompileError(format!("{e}")))?;

        // Check exports before linking so a bad module gets a precise error
        // rather than a generic instantiation failure.
        match export_func_type(&module, &config.step_export) {
            None => {
                return Err(WasmError::MissingExport {
                    name: config.step_export.clone(),
                })
            }
            Some(ty) => check_unit_signature(&config.step_export, ty.as_ref())?,
        }

        let has_start = match export_func_type(&module, &config.start_export) {
            None => false,
            Some(ty) => {
                check_unit_signature(&config.start_export, ty.as_ref())?;
                true
            }
        };

        let mut linker = Linker::new(&engine);
        register_host_api(&mut linker)
            .map_err(|e| WasmError::Runtime(format!("failed to register host API: {e}")))?;

        let instance_pre = linker
            .instantiate_pre(&module)
            .map_err(|e| WasmError::Link(format!("{e}")))?;

        tracing::debug!(
            fuel_per_step = config.fuel_per_step,
            memory_limit = config.memory_limit_bytes,
            has_start,
            "engine module compiled and linked"
        );

        Ok(Self {
            engine,
            instance_pre,
            has_start,
            config: config.clone(),
        })
    }

    /// Construct a new runtime from this engine.
    ///
    /// Creates a store with the configured memory limit, instantiates the
    /// module asynchronously, and runs the `start()` export (when present)
    /// under [`EngineConfig::startup_fuel`].
    ///
    /// # Errors
    ///
    /// - [`WasmError::Instantiate`] if instantiation fails (e.g. the module's
    ///   minimum memory exceeds the limit).
    /// - [`WasmError::Trap`] / [`WasmError::OutOfFuel`] if `start()` fails.
    /// - [`WasmError::Runtime`] on store configuration failures.
    pub async fn start(&self) -> Result<WasmRuntime, WasmError> {
        let limits = StoreLimitsBuilder::new()
            .memory_size(self.config.memory_limit_bytes)
            .build();

        let mut store = Store::new(&self.engine, HostState::with_limits(limits));
        store.limiter(|state| &mut state.limits);
        store
            .set_fuel(self.config.startup_fuel)
            .map_err(|e| WasmError::Runtime(format!("failed to set fuel: {e}")))?;
        store
            .fuel_async_yield_interval(self.config.fuel_yield_interval)
            .map_err(|e| WasmError::Runtime(format!("failed to set yield interval: {e}")))?;

        let instance = self
            .instance_pre
            .instantiate_async(&mut store)
            .await
            .map_err(|e| WasmError::Instantiate(format!("{e}")))?;

        if self.has_start {
            let start_fn = instance
                .get_typed_func::<(), ()>(&mut store, &self.config.start_export)
                .map_err(|e| {
                    WasmError::Runtime(format!(
                        "failed to resolve {}(): {e}",
                        self.config.start_export
                    ))
                })?;

            start_fn
                .call_async(&mut store, ())
                .await
                .map_err(|e| classify_trap(e, self.config.startup_fuel))?;

            tracing::debug!(export = %self.config.start_export, "engine start export completed");
        }

        WasmRuntime::new(store, instance, self.config.clone())
    }

    /// Whether the module exports the configured `start()` function.
    pub fn has_start_export(&self) -> bool {
        self.has_start
    }

    /// Returns the configuration used to create this engine.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("config", &self.config)
            .field("has_start", &self.has_start)
            .finish_non_exhaustive()
    }
}

// -- Internal helpers -------------------------------------------------------

/// Look up an export by name. `Some(None)` means the export exists but is not
/// a function.
fn export_func_type(module: &Module, name: &str) -> Option<Option<FuncType>> {
    module
        .exports()
        .find(|export| export.name() == name)
        .map(|export| match export.ty() {
            ExternType::Func(ty) => Some(ty),
            _ => None,
        })
}

fn check_unit_signature(name: &str, ty: Option<&FuncType>) -> Result<(), WasmError> {
    let ok = ty.is_some_and(|ty| ty.params().len() == 0 && ty.results().len() == 0);
    if ok {
        Ok(())
    } else {
        Err(WasmError::SignatureMismatch {
            name: name.to_owned(),
            expected: "a function taking no parameters and returning nothing".to_owned(),
        })
    }
}
