//! # boson-play
//!
//! Loads an engine module from disk and drives it on an interval clock until
//! interrupted, the frame limit is reached, or a step failure stops it.
//!
//! ```text
//! boson-play engine.wasm --frame-rate 60 --frames 600 --policy skip
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `boson=info`).

mod config;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use boson_engine::prelude::*;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::PlayConfig;

/// Retries granted when `--policy retry` replaces a non-retry policy.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Run a Boson engine module.
#[derive(Parser, Debug)]
#[command(name = "boson-play", version)]
#[command(about = "Drive a Boson engine module one step per frame")]
struct Cli {
    /// Engine module to load (.wasm or .wat).
    module: PathBuf,

    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host frames per second.
    #[arg(long)]
    frame_rate: Option<f64>,

    /// Stop after this many successful steps.
    #[arg(long)]
    frames: Option<u64>,

    /// What to do when a step fails.
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    Abort,
    Skip,
    Retry,
}

impl PolicyArg {
    /// Resolve against the configured policy, keeping its parameters when
    /// the kind already matches.
    fn resolve(self, current: &StepPolicy) -> StepPolicy {
        match (self, current) {
            (PolicyArg::Abort, _) => StepPolicy::Abort,
            (PolicyArg::Skip, StepPolicy::Skip { .. }) | (PolicyArg::Retry, StepPolicy::Retry { .. }) => {
                current.clone()
            }
            (PolicyArg::Skip, _) => StepPolicy::Skip {
                max_consecutive: None,
            },
            (PolicyArg::Retry, _) => StepPolicy::Retry {
                max_retries: DEFAULT_MAX_RETRIES,
                backoff_ms: 0,
            },
        }
    }
}

impl Cli {
    /// Command-line flags take precedence over the config file.
    fn apply(&self, config: &mut PlayConfig) {
        if let Some(frame_rate) = self.frame_rate {
            config.frame_rate = frame_rate;
        }
        if let Some(frames) = self.frames {
            config.driver.max_frames = Some(frames);
        }
        if let Some(policy) = self.policy {
            config.driver.step_policy = policy.resolve(&config.driver.step_policy);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("boson=info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => PlayConfig::load(path)?,
        None => PlayConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    info!(
        module = %cli.module.display(),
        frame_rate = config.frame_rate,
        policy = ?config.driver.step_policy,
        "boson-play starting"
    );

    let loader = WasmLoader::from_path(&cli.module, config.engine.clone());
    let clock = IntervalClock::try_new(config.frame_rate)
        .ok_or_else(|| anyhow!("unusable frame rate {}", config.frame_rate))?;
    // The engine module stays loaded for as long as the driver runs.
    let (_engine, runtime) = boson_engine::bootstrap(&loader).await?;
    let mut driver = FrameDriver::new(runtime, clock, config.driver.clone());

    let stop = driver.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping after the current step");
                stop.stop();
            }
            Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
        }
    });

    let report = driver.run().await?;
    info!(
        exit = ?report.exit,
        steps = report.stats.steps_completed,
        failed = report.stats.steps_failed,
        skipped = report.stats.frames_skipped,
        retries = report.stats.retries,
        "boson-play finished"
    );
    Ok(())
}
