//! The frame driver: one engine step per host frame.
//!
//! [`FrameDriver`] owns a [`RuntimeHandle`] and a [`HostClock`] and runs an
//! explicit loop:
//!
//! 1. Check the stop token.
//! 2. Register for the next frame (`Scheduled`) and wait for it, racing the
//!    stop token.
//! 3. Step the runtime (`Stepping`) and wait for the step to settle.
//! 4. Route failures through the [`StepPolicy`], then go back to 1.
//!
//! A new registration is only made after the previous step has settled, so
//! step *k + 1* never starts before step *k* finishes and at most one frame
//! registration is ever outstanding. A slow step simply delays the next
//! registration; nothing queues up behind it.
//!
//! # Example
//!
//! ```
//! use boson_engine::prelude::*;
//!
//! struct Counter(u32);
//!
//! impl RuntimeHandle for Counter {
//!     async fn step(&mut self, _frame: &FrameTick) -> Result<(), StepError> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().start_paused(true).build().unwrap().block_on(async {
//! let config = DriverConfig { max_frames: Some(3), ..Default::default() };
//! let mut driver = FrameDriver::new(Counter(0), IntervalClock::new(60.0), config);
//!
//! let report = driver.run().await.unwrap();
//! assert_eq!(report.exit, DriverExit::FrameLimit);
//! assert_eq!(driver.runtime().0, 3);
//! # });
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::clock::{FrameTick, HostClock};
use crate::error::{DriverError, StepError};
use crate::lifecycle::RuntimeHandle;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What the driver does when a step fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum StepPolicy {
    /// Log the failure and stop the driver with [`DriverError::Step`].
    #[default]
    Abort,
    /// Re-run the step for the same frame, waiting `backoff_ms * attempt`
    /// between attempts. After `max_retries` failed retries the driver stops
    /// with [`DriverError::RetriesExhausted`].
    Retry {
        /// Retries allowed after the first failure.
        max_retries: u32,
        /// Base backoff in milliseconds.
        #[serde(default)]
        backoff_ms: u64,
    },
    /// Log the failure, drop the frame and wait for the next one. With
    /// `max_consecutive` set, a longer failure streak stops the driver with
    /// [`DriverError::TooManySkipped`].
    Skip {
        /// Longest tolerated streak of failed frames.
        #[serde(default)]
        max_consecutive: Option<u32>,
    },
}

/// Configuration for a [`FrameDriver`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// How step failures are handled. Default: [`StepPolicy::Abort`].
    pub step_policy: StepPolicy,
    /// Fail a step that has not settled after this many milliseconds.
    /// `None` waits indefinitely.
    pub step_timeout_ms: Option<u64>,
    /// Stop after this many successful steps. `None` runs until stopped.
    pub max_frames: Option<u64>,
}

impl DriverConfig {
    /// [`step_timeout_ms`](Self::step_timeout_ms) as a [`Duration`].
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_ms.map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// State and reporting
// ---------------------------------------------------------------------------

/// Where the driver is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Constructed, not yet running.
    Idle,
    /// A frame registration is outstanding.
    Scheduled,
    /// A step is in flight.
    Stepping,
    /// [`FrameDriver::run`] has returned.
    Stopped,
}

/// Why [`FrameDriver::run`] returned successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverExit {
    /// A [`StopHandle`] asked the driver to stop.
    Stopped,
    /// The host clock closed.
    ClockClosed,
    /// [`DriverConfig::max_frames`] steps completed.
    FrameLimit,
}

/// Counters accumulated over the driver's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Frame registrations made with the host clock.
    pub frames_scheduled: u64,
    /// Steps that completed successfully.
    pub steps_completed: u64,
    /// Step attempts that failed (including retries and timeouts).
    pub steps_failed: u64,
    /// Frames dropped under [`StepPolicy::Skip`].
    pub frames_skipped: u64,
    /// Retries performed under [`StepPolicy::Retry`].
    pub retries: u64,
    /// Index of the last frame the host fired.
    pub last_frame: Option<u64>,
}

/// Result of a driver run that ended without a fatal step failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverReport {
    /// Why the loop ended.
    pub exit: DriverExit,
    /// Counters at the time the loop ended.
    pub stats: DriverStats,
}

// ---------------------------------------------------------------------------
// StopHandle
// ---------------------------------------------------------------------------

/// Asks a running [`FrameDriver`] to stop.
///
/// The driver checks the token before every frame registration and races it
/// against the pending frame. A step already in flight is allowed to finish.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Resolves once the stop flag is set.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stopped| *stopped).await.is_err() {
        // The driver keeps its own sender alive, so this is unreachable in
        // practice; never resolving is the correct reading of "no stop".
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// FrameDriver
// ---------------------------------------------------------------------------

/// Outcome of a single fired frame.
enum FrameOutcome {
    Completed,
    Skipped,
    Stopped,
}

/// Drives a runtime one step per host frame.
pub struct FrameDriver<R, C> {
    runtime: R,
    clock: C,
    config: DriverConfig,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<DriverState>,
    stats: DriverStats,
    consecutive_failures: u32,
}

impl<R: RuntimeHandle, C: HostClock> FrameDriver<R, C> {
    /// Create an idle driver. Nothing is registered until [`run`](Self::run).
    pub fn new(runtime: R, clock: C, config: DriverConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, _) = watch::channel(DriverState::Idle);
        Self {
            runtime,
            clock,
            config,
            stop_tx: Arc::new(stop_tx),
            stop_rx,
            state_tx,
            stats: DriverStats::default(),
            consecutive_failures: 0,
        }
    }

    /// Run the loop until stopped, the clock closes, the frame limit is
    /// reached, or the step policy gives up.
    ///
    /// May be called again after it returns; counters carry over.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] when the [`StepPolicy`] stops the driver.
    pub async fn run(&mut self) -> Result<DriverReport, DriverError> {
        info!(
            policy = ?self.config.step_policy,
            step_timeout_ms = ?self.config.step_timeout_ms,
            max_frames = ?self.config.max_frames,
            "frame driver starting"
        );

        let result = self.drive().await;
        self.set_state(DriverState::Stopped);

        match result {
            Ok(exit) => {
                info!(
                    ?exit,
                    steps = self.stats.steps_completed,
                    skipped = self.stats.frames_skipped,
                    "frame driver stopped"
                );
                Ok(DriverReport {
                    exit,
                    stats: self.stats.clone(),
                })
            }
            Err(e) => {
                error!(
                    error = %e,
                    steps = self.stats.steps_completed,
                    "frame driver aborted"
                );
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<DriverExit, DriverError> {
        loop {
            if *self.stop_rx.borrow() {
                return Ok(DriverExit::Stopped);
            }
            if self
                .config
                .max_frames
                .is_some_and(|max| self.stats.steps_completed >= max)
            {
                return Ok(DriverExit::FrameLimit);
            }

            self.set_state(DriverState::Scheduled);
            self.stats.frames_scheduled += 1;

            let tick = tokio::select! {
                biased;
                () = stop_requested(&mut self.stop_rx) => return Ok(DriverExit::Stopped),
                tick = self.clock.next_frame() => tick,
            };
            let Some(tick) = tick else {
                return Ok(DriverExit::ClockClosed);
            };

            self.set_state(DriverState::Stepping);
            self.stats.last_frame = Some(tick.index);
            debug!(
                frame = tick.index,
                elapsed_ms = tick.elapsed.as_millis() as u64,
                delta_ms = tick.delta.as_millis() as u64,
                "frame fired"
            );

            match self.run_frame(&tick).await? {
                FrameOutcome::Completed | FrameOutcome::Skipped => {}
                FrameOutcome::Stopped => return Ok(DriverExit::Stopped),
            }
        }
    }

    /// Step once for `tick`, applying the step policy to failures.
    async fn run_frame(&mut self, tick: &FrameTick) -> Result<FrameOutcome, DriverError> {
        let frame = tick.index;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let err = match self.step_once(tick).await {
                Ok(()) => {
                    self.stats.steps_completed += 1;
                    self.consecutive_failures = 0;
                    return Ok(FrameOutcome::Completed);
                }
                Err(err) => err,
            };
            self.stats.steps_failed += 1;

            match self.config.step_policy {
                StepPolicy::Abort => {
                    return Err(DriverError::Step { frame, source: err });
                }
                StepPolicy::Retry {
                    max_retries,
                    backoff_ms,
                } => {
                    if attempt > max_retries {
                        return Err(DriverError::RetriesExhausted {
                            frame,
                            attempts: attempt,
                            source: err,
                        });
                    }

                    let backoff = Duration::from_millis(backoff_ms).saturating_mul(attempt);
                    warn!(
                        frame,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "step failed, retrying"
                    );
                    self.stats.retries += 1;

                    if !backoff.is_zero() {
                        tokio::select! {
                            biased;
                            () = stop_requested(&mut self.stop_rx) => return Ok(FrameOutcome::Stopped),
                            () = tokio::time::sleep(backoff) => {}
                        }
                    }
                    if *self.stop_rx.borrow() {
                        return Ok(FrameOutcome::Stopped);
                    }
                }
                StepPolicy::Skip { max_consecutive } => {
                    self.consecutive_failures += 1;
                    if max_consecutive.is_some_and(|max| self.consecutive_failures > max) {
                        return Err(DriverError::TooManySkipped {
                            consecutive: self.consecutive_failures,
                            source: err,
                        });
                    }

                    warn!(
                        frame,
                        consecutive = self.consecutive_failures,
                        error = %err,
                        "step failed, skipping frame"
                    );
                    self.stats.frames_skipped += 1;
                    return Ok(FrameOutcome::Skipped);
                }
            }
        }
    }

    async fn step_once(&mut self, tick: &FrameTick) -> Result<(), StepError> {
        trace!(frame = tick.index, "step begin");
        match self.config.step_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, self.runtime.step(tick))
                .await
                .unwrap_or(Err(StepError::TimedOut { timeout })),
            None => self.runtime.step(tick).await,
        }
    }

    fn set_state(&self, state: DriverState) {
        self.state_tx.send_replace(state);
    }

    // -- accessors ----------------------------------------------------------

    /// A handle that stops this driver from anywhere.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.stop_tx),
        }
    }

    /// Subscribe to state transitions.
    pub fn state_watcher(&self) -> watch::Receiver<DriverState> {
        self.state_tx.subscribe()
    }

    /// The current loop state.
    pub fn state(&self) -> DriverState {
        *self.state_tx.borrow()
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    /// The configuration this driver was created with.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The runtime being driven.
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// The host clock pacing the driver.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Tear the driver down, returning the runtime and the clock.
    pub fn into_parts(self) -> (R, C) {
        (self.runtime, self.clock)
    }
}

impl<R, C> std::fmt::Debug for FrameDriver<R, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDriver")
            .field("config", &self.config)
            .field("state", &*self.state_tx.borrow())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
