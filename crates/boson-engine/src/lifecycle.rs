//! Engine lifecycle: load a module, start a runtime, hand it to a driver.
//!
//! The three traits mirror the three phases an engine goes through. A
//! [`ModuleLoader`] produces an [`EngineModule`]; starting the module yields a
//! [`RuntimeHandle`]; the handle is then stepped once per host frame by a
//! [`FrameDriver`].
//!
//! Each phase gates the next: a load failure never reaches `start()`, and a
//! startup failure never reaches the driver.

use tracing::{error, info};

use crate::clock::{FrameTick, HostClock};
use crate::driver::{DriverConfig, DriverReport, FrameDriver};
use crate::error::{InitializationError, RunError, StartupError, StepError};

/// Produces a loaded engine module.
#[allow(async_fn_in_trait)]
pub trait ModuleLoader {
    /// The module type this loader produces.
    type Module: EngineModule;

    /// Fetch, compile and link the module.
    async fn load(&self) -> Result<Self::Module, InitializationError>;
}

/// A loaded engine module that can start runtimes.
#[allow(async_fn_in_trait)]
pub trait EngineModule {
    /// The runtime handle returned by [`start`](Self::start).
    type Runtime: RuntimeHandle;

    /// Construct a new runtime. Every call yields an independent runtime.
    async fn start(&self) -> Result<Self::Runtime, StartupError>;
}

/// A started engine that advances one frame per [`step`](Self::step).
#[allow(async_fn_in_trait)]
pub trait RuntimeHandle {
    /// Advance the engine by one frame. The driver never calls this again
    /// until the returned future has settled.
    async fn step(&mut self, frame: &FrameTick) -> Result<(), StepError>;
}

/// The runtime type produced by a loader's module.
pub type RuntimeOf<L> = <<L as ModuleLoader>::Module as EngineModule>::Runtime;

/// Load the module, then start it.
///
/// # Errors
///
/// [`RunError::Initialization`] if loading fails (start is not attempted),
/// [`RunError::Startup`] if starting fails.
pub async fn bootstrap<L: ModuleLoader>(
    loader: &L,
) -> Result<(L::Module, RuntimeOf<L>), RunError> {
    let module = loader.load().await.inspect_err(|e| {
        error!(error = %e, "engine module failed to load");
    })?;
    info!("engine module loaded");

    let runtime = module.start().await.inspect_err(|e| {
        error!(error = %e, "engine startup failed");
    })?;
    info!("engine runtime started");

    Ok((module, runtime))
}

/// Bootstrap the engine and wrap the runtime in an idle [`FrameDriver`].
///
/// The module is released once the runtime has started. Callers that must
/// keep it alive for the lifetime of the loop use [`bootstrap`] and
/// [`FrameDriver::new`] directly, or [`run`].
pub async fn launch<L: ModuleLoader, C: HostClock>(
    loader: &L,
    clock: C,
    config: DriverConfig,
) -> Result<FrameDriver<RuntimeOf<L>, C>, RunError> {
    let (_module, runtime) = bootstrap(loader).await?;
    Ok(FrameDriver::new(runtime, clock, config))
}

/// Bootstrap the engine and drive it until the loop ends.
///
/// The module stays alive until the driver has stopped.
pub async fn run<L: ModuleLoader, C: HostClock>(
    loader: &L,
    clock: C,
    config: DriverConfig,
) -> Result<DriverReport, RunError> {
    let (module, runtime) = bootstrap(loader).await?;
    let mut driver = FrameDriver::new(runtime, clock, config);
    let report = driver.run().await;
    drop(module);
    Ok(report?)
}
