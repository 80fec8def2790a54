//! Host clocks: the "call me once before the next frame" primitive.
//!
//! A [`HostClock`] hands out one frame at a time. [`HostClock::next_frame`]
//! registers a single callback with the host and resolves when the host fires
//! it. Because the method takes `&mut self`, a second registration cannot be
//! made while one is pending, and dropping the returned future withdraws the
//! registration.
//!
//! Two clocks are provided:
//!
//! - [`IntervalClock`]: paces frames with a tokio interval at a fixed rate,
//!   standing in for a display refresh.
//! - [`ManualClock`]: frames fire only when a [`ManualClockController`] says
//!   so. Used by tests and by embedders that own their own frame loop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Frame delta used by [`ManualClockController::fire`]: one 60 Hz frame.
pub const DEFAULT_FRAME_DELTA: Duration = Duration::from_nanos(16_666_667);

// ---------------------------------------------------------------------------
// FrameTick
// ---------------------------------------------------------------------------

/// Metadata for one fired frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTick {
    /// Frames fired by this clock before this one (starts at 0).
    pub index: u64,
    /// Host time since the clock's first frame.
    pub elapsed: Duration,
    /// Host time since the previous frame.
    pub delta: Duration,
}

impl FrameTick {
    /// [`elapsed`](Self::elapsed) in seconds.
    pub fn sim_time(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// [`delta`](Self::delta) in seconds.
    pub fn delta_seconds(&self) -> f64 {
        self.delta.as_secs_f64()
    }
}

// ---------------------------------------------------------------------------
// HostClock
// ---------------------------------------------------------------------------

/// The host's per-frame scheduling primitive.
#[allow(async_fn_in_trait)]
pub trait HostClock {
    /// Register for the next frame and wait for it to fire.
    ///
    /// Returns `None` once the host has gone away; no further frames will
    /// ever fire.
    async fn next_frame(&mut self) -> Option<FrameTick>;
}

// ---------------------------------------------------------------------------
// IntervalClock
// ---------------------------------------------------------------------------

/// Fires frames at a fixed rate using a tokio interval.
///
/// Frames the driver was too slow to take are skipped rather than delivered
/// in a burst, so a slow step never causes catch-up stepping. The first frame
/// fires immediately. Never closes.
#[derive(Debug)]
pub struct IntervalClock {
    period: Duration,
    interval: Option<Interval>,
    start: Option<Instant>,
    last: Option<Instant>,
    frames: u64,
}

impl IntervalClock {
    /// Create a clock firing `frame_rate` times per second.
    ///
    /// The interval itself is created lazily on the first frame, so the clock
    /// may be constructed outside a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if [`period_for`](Self::period_for) rejects `frame_rate`.
    pub fn new(frame_rate: f64) -> Self {
        Self::try_new(frame_rate).unwrap_or_else(|| {
            panic!("frame_rate must be positive and finite with a non-zero period, got {frame_rate}")
        })
    }

    /// Like [`new`](Self::new), but returns `None` for an unusable rate.
    pub fn try_new(frame_rate: f64) -> Option<Self> {
        Self::period_for(frame_rate).map(Self::with_period)
    }

    /// The frame period for `frame_rate`, or `None` if the rate is not
    /// positive and finite, or its period rounds to zero or does not fit in
    /// a [`Duration`].
    pub fn period_for(frame_rate: f64) -> Option<Duration> {
        if !(frame_rate > 0.0 && frame_rate.is_finite()) {
            return None;
        }
        Duration::try_from_secs_f64(frame_rate.recip())
            .ok()
            .filter(|period| !period.is_zero())
    }

    /// Create a clock firing once every `period`.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn with_period(period: Duration) -> Self {
        assert!(!period.is_zero(), "frame period must be non-zero");
        Self {
            period,
            interval: None,
            start: None,
            last: None,
            frames: 0,
        }
    }

    /// Time between frames.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Number of frames fired so far.
    pub fn frames_fired(&self) -> u64 {
        self.frames
    }
}

impl HostClock for IntervalClock {
    async fn next_frame(&mut self) -> Option<FrameTick> {
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        interval.tick().await;
        let now = Instant::now();
        let start = *self.start.get_or_insert(now);
        let delta = self.last.map_or(period, |last| now - last);
        self.last = Some(now);

        let tick = FrameTick {
            index: self.frames,
            elapsed: now - start,
            delta,
        };
        self.frames += 1;
        Some(tick)
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PendingFrame {
    id: u64,
    tx: oneshot::Sender<FrameTick>,
}

#[derive(Debug, Default)]
struct ManualShared {
    pending: Option<PendingFrame>,
    next_id: u64,
    registrations: u64,
    frames: u64,
    elapsed: Duration,
    closed: bool,
}

fn lock(shared: &Mutex<ManualShared>) -> MutexGuard<'_, ManualShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A clock whose frames are fired explicitly by a [`ManualClockController`].
#[derive(Debug)]
pub struct ManualClock {
    shared: Arc<Mutex<ManualShared>>,
}

/// The host side of a [`ManualClock`].
///
/// Dropping the controller closes the clock.
#[derive(Debug)]
pub struct ManualClockController {
    shared: Arc<Mutex<ManualShared>>,
}

impl ManualClock {
    /// Create a clock and the controller that fires its frames.
    pub fn new() -> (ManualClock, ManualClockController) {
        let shared = Arc::new(Mutex::new(ManualShared::default()));
        (
            ManualClock {
                shared: Arc::clone(&shared),
            },
            ManualClockController { shared },
        )
    }
}

/// Withdraws a registration whose future was dropped before it fired.
struct Registration<'a> {
    shared: &'a Mutex<ManualShared>,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut shared = lock(self.shared);
        if shared.pending.as_ref().is_some_and(|p| p.id == self.id) {
            shared.pending = None;
        }
    }
}

impl HostClock for ManualClock {
    async fn next_frame(&mut self) -> Option<FrameTick> {
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut shared = lock(&self.shared);
            if shared.closed {
                return None;
            }
            let id = shared.next_id;
            shared.next_id += 1;
            shared.registrations += 1;
            shared.pending = Some(PendingFrame { id, tx });
            id
        };

        let _registration = Registration {
            shared: &self.shared,
            id,
        };
        rx.await.ok()
    }
}

impl ManualClockController {
    /// Fire the pending registration with a [`DEFAULT_FRAME_DELTA`] step.
    ///
    /// Returns `false` if nothing was registered.
    pub fn fire(&self) -> bool {
        self.fire_after(DEFAULT_FRAME_DELTA)
    }

    /// Fire the pending registration, advancing host time by `delta`.
    ///
    /// Returns `false` if nothing was registered (host time does not advance).
    pub fn fire_after(&self, delta: Duration) -> bool {
        let mut shared = lock(&self.shared);
        let Some(pending) = shared.pending.take() else {
            return false;
        };

        shared.elapsed += delta;
        let tick = FrameTick {
            index: shared.frames,
            elapsed: shared.elapsed,
            delta,
        };
        shared.frames += 1;
        pending.tx.send(tick).is_ok()
    }

    /// Number of registrations currently waiting to fire (0 or 1).
    pub fn outstanding(&self) -> usize {
        usize::from(lock(&self.shared).pending.is_some())
    }

    /// Total registrations made since the clock was created.
    pub fn registrations(&self) -> u64 {
        lock(&self.shared).registrations
    }

    /// Total frames fired since the clock was created.
    pub fn frames_fired(&self) -> u64 {
        lock(&self.shared).frames
    }

    /// Close the clock: the pending registration (if any) and every later
    /// one resolve to `None`.
    pub fn close(&self) {
        let mut shared = lock(&self.shared);
        shared.closed = true;
        shared.pending = None;
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        lock(&self.shared).closed
    }
}

impl Drop for ManualClockController {
    fn drop(&mut self) {
        self.close();
    }
}
