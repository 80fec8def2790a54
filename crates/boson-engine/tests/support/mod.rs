//! Scriptable fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use boson_engine::prelude::*;
use tokio::sync::Semaphore;

// -- probe ------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Begin(u64),
    End(u64),
}

#[derive(Debug, Default)]
struct ProbeState {
    loads: u32,
    starts: u32,
    module_drops: u32,
    calls: u64,
    frames: Vec<u64>,
    events: Vec<Event>,
    in_flight: u32,
    max_in_flight: u32,
}

/// Records everything the fakes were asked to do.
#[derive(Debug, Clone, Default)]
pub struct Probe(Arc<Mutex<ProbeState>>);

impl Probe {
    fn state(&self) -> MutexGuard<'_, ProbeState> {
        self.0.lock().unwrap()
    }

    pub fn loads(&self) -> u32 {
        self.state().loads
    }

    pub fn starts(&self) -> u32 {
        self.state().starts
    }

    /// Number of [`FakeModule`]s dropped.
    pub fn module_drops(&self) -> u32 {
        self.state().module_drops
    }

    /// Number of `step()` calls made.
    pub fn calls(&self) -> u64 {
        self.state().calls
    }

    /// Frame index passed to each `step()` call, in call order.
    pub fn frames(&self) -> Vec<u64> {
        self.state().frames.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn in_flight(&self) -> u32 {
        self.state().in_flight
    }

    pub fn max_in_flight(&self) -> u32 {
        self.state().max_in_flight
    }
}

// -- script -----------------------------------------------------------------

type FailFn = Arc<dyn Fn(u64) -> bool + Send + Sync>;

/// How a [`FakeRuntime`] behaves on each call.
#[derive(Clone, Default)]
pub struct Script {
    fail: Option<FailFn>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
}

impl Script {
    /// Fail the given 1-based call numbers.
    pub fn failing_on(calls: &'static [u64]) -> Self {
        Self {
            fail: Some(Arc::new(move |call| calls.contains(&call))),
            ..Self::default()
        }
    }

    /// Fail every call for which `fail` returns true.
    pub fn failing_when(fail: impl Fn(u64) -> bool + Send + Sync + 'static) -> Self {
        Self {
            fail: Some(Arc::new(fail)),
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self {
            fail: Some(Arc::new(|_| true)),
            ..Self::default()
        }
    }

    /// Each step sleeps for `delay` before settling.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Each step waits for one permit from `gate` before settling.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

// -- fakes ------------------------------------------------------------------

pub struct FakeRuntime {
    probe: Probe,
    script: Script,
    steps: u64,
}

impl FakeRuntime {
    pub fn new(probe: Probe, script: Script) -> Self {
        Self {
            probe,
            script,
            steps: 0,
        }
    }

    /// Successful steps taken by this runtime alone.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

/// Marks a step as settled even if its future is dropped mid-flight.
struct InFlight<'a> {
    probe: &'a Probe,
    call: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.probe.state();
        state.in_flight -= 1;
        state.events.push(Event::End(self.call));
    }
}

impl RuntimeHandle for FakeRuntime {
    async fn step(&mut self, frame: &FrameTick) -> Result<(), StepError> {
        let call = {
            let mut state = self.probe.state();
            state.calls += 1;
            let call = state.calls;
            state.frames.push(frame.index);
            state.events.push(Event::Begin(call));
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            call
        };
        let _in_flight = InFlight {
            probe: &self.probe,
            call,
        };

        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.script.gate {
            gate.acquire()
                .await
                .map_err(|e| StepError::Message(e.to_string()))?
                .forget();
        }

        if let Some(fail) = &self.script.fail {
            if fail(call) {
                return Err(StepError::Message(format!("scripted failure on call {call}")));
            }
        }
        self.steps += 1;
        Ok(())
    }
}

pub struct FakeModule {
    probe: Probe,
    script: Script,
    fail_start: bool,
}

impl EngineModule for FakeModule {
    type Runtime = FakeRuntime;

    async fn start(&self) -> Result<FakeRuntime, StartupError> {
        self.probe.state().starts += 1;
        if self.fail_start {
            return Err(StartupError::Message("no resources".into()));
        }
        Ok(FakeRuntime::new(self.probe.clone(), self.script.clone()))
    }
}

impl Drop for FakeModule {
    fn drop(&mut self) {
        self.probe.state().module_drops += 1;
    }
}

pub struct FakeLoader {
    pub probe: Probe,
    pub script: Script,
    pub fail_load: bool,
    pub fail_start: bool,
}

impl FakeLoader {
    pub fn new(probe: Probe, script: Script) -> Self {
        Self {
            probe,
            script,
            fail_load: false,
            fail_start: false,
        }
    }
}

impl ModuleLoader for FakeLoader {
    type Module = FakeModule;

    async fn load(&self) -> Result<FakeModule, InitializationError> {
        self.probe.state().loads += 1;
        if self.fail_load {
            return Err(InitializationError::Message("module not found".into()));
        }
        Ok(FakeModule {
            probe: self.probe.clone(),
            script: self.script.clone(),
            fail_start: self.fail_start,
        })
    }
}

// -- helpers ----------------------------------------------------------------

/// Poll `condition` every simulated millisecond until it holds.
///
/// Sleeping (rather than yielding) lets paused-time tests auto-advance.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

/// Fire `frames` frames, each as soon as a registration is outstanding.
pub async fn fire_frames(host: &ManualClockController, frames: u64) {
    for _ in 0..frames {
        wait_until(|| host.outstanding() == 1).await;
        assert!(host.fire(), "a registration should be pending");
    }
}
