//! Lifecycle adapters for WebAssembly engine modules.

use std::path::PathBuf;

use boson_host::{EngineConfig, WasmEngine, WasmRuntime};
use tracing::debug;

use crate::clock::FrameTick;
use crate::error::{InitializationError, StartupError, StepError};
use crate::lifecycle::{EngineModule, ModuleLoader, RuntimeHandle};

/// Where a [`WasmLoader`] gets its module bytes.
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// A `.wasm` or `.wat` file on disk, read when [`ModuleLoader::load`] runs.
    Path(PathBuf),
    /// Module bytes already in memory.
    Bytes(Vec<u8>),
}

/// Loads a [`WasmEngine`] from a [`ModuleSource`].
#[derive(Debug, Clone)]
pub struct WasmLoader {
    source: ModuleSource,
    config: EngineConfig,
}

impl WasmLoader {
    pub fn new(source: ModuleSource, config: EngineConfig) -> Self {
        Self { source, config }
    }

    pub fn from_path(path: impl Into<PathBuf>, config: EngineConfig) -> Self {
        Self::new(ModuleSource::Path(path.into()), config)
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>, config: EngineConfig) -> Self {
        Self::new(ModuleSource::Bytes(bytes.into()), config)
    }

    pub fn source(&self) -> &ModuleSource {
        &self.source
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl ModuleLoader for WasmLoader {
    type Module = WasmEngine;

    async fn load(&self) -> Result<WasmEngine, InitializationError> {
        let engine = match &self.source {
            ModuleSource::Path(path) => {
                debug!(path = %path.display(), "reading engine module");
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|source| InitializationError::Read {
                        path: path.clone(),
                        source,
                    })?;
                WasmEngine::from_bytes(&self.config, &bytes)?
            }
            ModuleSource::Bytes(bytes) => WasmEngine::from_bytes(&self.config, bytes)?,
        };
        Ok(engine)
    }
}

impl EngineModule for WasmEngine {
    type Runtime = WasmRuntime;

    async fn start(&self) -> Result<WasmRuntime, StartupError> {
        Ok(WasmEngine::start(self).await?)
    }
}

impl RuntimeHandle for WasmRuntime {
    async fn step(&mut self, frame: &FrameTick) -> Result<(), StepError> {
        let fuel = WasmRuntime::step(self, frame.index, frame.sim_time(), frame.delta_seconds())
            .await?;
        debug!(frame = frame.index, fuel, "wasm step complete");
        Ok(())
    }
}
