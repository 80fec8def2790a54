//! Host API for the engine module.
//!
//! Defines the [`HostState`] that lives inside each Wasmtime [`Store`] and the
//! [`register_host_api`] function that registers the host functions under the
//! `"boson"` WASM import namespace.
//!
//! # Host Functions (registered under `"boson"` module)
//!
//! ## Frame metadata
//! - `frame_number() -> i64`
//! - `sim_time() -> f64`
//! - `delta_time() -> f64`
//!
//! ## Guest logging
//! - `log(level: i32, ptr: i32, len: i32)`
//!
//! [`Store`]: wasmtime::Store

use wasmtime::{Caller, Linker, StoreLimits, StoreLimitsBuilder};

// ---------------------------------------------------------------------------
// HostState
// ---------------------------------------------------------------------------

/// State held inside the Wasmtime [`Store`](wasmtime::Store) for host function
/// dispatch.
pub struct HostState {
    /// Index of the frame being stepped, set via [`begin_step`](Self::begin_step).
    pub frame: u64,

    /// Seconds elapsed on the host clock when the current frame fired.
    pub sim_time: f64,

    /// Seconds between the current frame and the previous one.
    pub delta_time: f64,

    /// Number of host function calls made during the current step.
    /// Reset on [`begin_step`](Self::begin_step).
    pub host_call_count: u32,

    /// Total number of messages the guest has logged.
    pub log_count: u64,

    /// Resource limits enforced on the store (linear memory size).
    pub(crate) limits: StoreLimits,
}

impl HostState {
    /// Fresh state with no memory limit.
    pub fn new() -> Self {
        Self::with_limits(StoreLimitsBuilder::new().build())
    }

    pub(crate) fn with_limits(limits: StoreLimits) -> Self {
        Self {
            frame: 0,
            sim_time: 0.0,
            delta_time: 0.0,
            host_call_count: 0,
            log_count: 0,
            limits,
        }
    }

    /// Prepare for a new step. Resets the per-step host call counter and
    /// records the frame metadata the guest can query.
    pub fn begin_step(&mut self, frame: u64, sim_time: f64, delta_time: f64) {
        self.frame = frame;
        self.sim_time = sim_time;
        self.delta_time = delta_time;
        self.host_call_count = 0;
    }
}

impl Default for HostState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostState")
            .field("frame", &self.frame)
            .field("sim_time", &self.sim_time)
            .field("delta_time", &self.delta_time)
            .field("host_call_count", &self.host_call_count)
            .field("log_count", &self.log_count)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Host function registration
// ---------------------------------------------------------------------------

/// Define the `"boson"` imports on `linker`.
///
/// # Errors
///
/// Fails only if one of the names is already defined on the linker.
pub fn register_host_api(linker: &mut Linker<HostState>) -> Result<(), anyhow::Error> {
    linker.func_wrap("boson", "frame_number", host_frame_number)?;
    linker.func_wrap("boson", "sim_time", host_sim_time)?;
    linker.func_wrap("boson", "delta_time", host_delta_time)?;
    linker.func_wrap("boson", "log", host_log)?;
    Ok(())
}

/// Copy `len` bytes at `ptr` out of the guest's exported `"memory"` and decode
/// them as UTF-8.
fn guest_str(caller: &mut Caller<'_, HostState>, ptr: i32, len: i32) -> Result<String, String> {
    let Some(memory) = caller.get_export("memory").and_then(|e| e.into_memory()) else {
        return Err("guest has no exported \"memory\"".to_owned());
    };

    let (Ok(start), Ok(len_usize)) = (usize::try_from(ptr), usize::try_from(len)) else {
        return Err(format!("negative string range: ptr={ptr}, len={len}"));
    };

    let data = memory.data(&caller);
    let Some(bytes) = start.checked_add(len_usize).and_then(|end| data.get(start..end)) else {
        return Err(format!(
            "string range {start}..{} exceeds guest memory of {} bytes",
            start.saturating_add(len_usize),
            data.len()
        ));
    };

    String::from_utf8(bytes.to_vec()).map_err(|e| format!("guest string is not UTF-8: {e}"))
}

// ---------------------------------------------------------------------------
// Frame metadata
// ---------------------------------------------------------------------------

/// `frame_number() -> i64`
fn host_frame_number(mut caller: Caller<'_, HostState>) -> i64 {
    caller.data_mut().host_call_count += 1;
    caller.data().frame as i64
}

/// `sim_time() -> f64`
fn host_sim_time(mut caller: Caller<'_, HostState>) -> f64 {
    caller.data_mut().host_call_count += 1;
    caller.data().sim_time
}

/// `delta_time() -> f64`
fn host_delta_time(mut caller: Caller<'_, HostState>) -> f64 {
    caller.data_mut().host_call_count += 1;
    caller.data().delta_time
}

// ---------------------------------------------------------------------------
// Guest logging
// ---------------------------------------------------------------------------

/// `log(level, ptr, len)`: forward a guest message to `tracing`.
///
/// Levels 0 through 4 map to trace, debug, info, warn and error; anything else
/// is logged at info with the raw level attached. An unreadable message is
/// dropped with a warning and does not trap the guest.
fn host_log(mut caller: Caller<'_, HostState>, level: i32, ptr: i32, len: i32) {
    caller.data_mut().host_call_count += 1;

    let msg = match guest_str(&mut caller, ptr, len) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(error = %e, "dropping guest log message");
            return;
        }
    };

    caller.data_mut().log_count += 1;
    let frame = caller.data().frame;

    match level {
        0 => tracing::trace!(source = "wasm", frame, "{msg}"),
        1 => tracing::debug!(source = "wasm", frame, "{msg}"),
        2 => tracing::info!(source = "wasm", frame, "{msg}"),
        3 => tracing::warn!(source = "wasm", frame, "{msg}"),
        4 => tracing::error!(source = "wasm", frame, "{msg}"),
        _ => tracing::info!(source = "wasm", frame, level, "{msg}"),
    }
}
