//! `boson-play` configuration file.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use boson_engine::boson_host::EngineConfig;
use boson_engine::clock::IntervalClock;
use boson_engine::driver::DriverConfig;

/// Frame rate used when neither the file nor the command line sets one.
pub const DEFAULT_FRAME_RATE: f64 = 60.0;

/// Everything `boson-play` needs besides the module path. Every field is
/// optional in the JSON file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PlayConfig {
    /// WASM sandbox settings.
    pub engine: EngineConfig,
    /// Step policy, step timeout and frame limit.
    pub driver: DriverConfig,
    /// Host frames per second.
    pub frame_rate: f64,
}

impl Default for PlayConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            driver: DriverConfig::default(),
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }
}

impl PlayConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reject settings the driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            IntervalClock::period_for(self.frame_rate).is_some(),
            "frame_rate must be positive, finite and give a non-zero frame period, got {}",
            self.frame_rate
        );
        ensure!(self.engine.fuel_per_step > 0, "engine.fuel_per_step must be non-zero");
        ensure!(
            self.driver.step_timeout_ms != Some(0),
            "driver.step_timeout_ms must be non-zero"
        );
        Ok(())
    }
}
