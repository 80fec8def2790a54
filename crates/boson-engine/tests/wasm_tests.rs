//! End-to-end tests: WebAssembly engine modules loaded from disk and driven
//! by the frame driver.

mod support;

use std::path::PathBuf;
use std::time::Duration;

use boson_engine::prelude::*;
use support::{fire_frames, wait_until};

/// Path of a `.wat` fixture shared with the host crate.
fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("boson-host")
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn loader(name: &str) -> WasmLoader {
    WasmLoader::from_path(fixture(name), EngineConfig::default())
}

#[tokio::test]
async fn missing_file_is_an_initialization_error() {
    let loader = loader("does_not_exist.wasm");
    let (clock, host) = ManualClock::new();

    let err = boson_engine::run(&loader, clock, DriverConfig::default())
        .await
        .unwrap_err();
    match err {
        RunError::Initialization(InitializationError::Read { path, source }) => {
            assert!(path.ends_with("does_not_exist.wasm"));
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(host.registrations(), 0);
}

#[tokio::test]
async fn unresolved_import_fails_to_load() {
    let err = boson_engine::bootstrap(&loader("wasi_import.wat"))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            RunError::Initialization(InitializationError::Wasm(WasmError::Link(_)))
        ),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn missing_step_export_fails_to_load() {
    let err = boson_engine::bootstrap(&loader("no_step.wat"))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            RunError::Initialization(InitializationError::Wasm(WasmError::MissingExport { .. }))
        ),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn trapping_start_is_a_startup_error() {
    let (clock, host) = ManualClock::new();
    let err = boson_engine::run(&loader("bad_start.wat"), clock, DriverConfig::default())
        .await
        .unwrap_err();

    assert!(
        matches!(err, RunError::Startup(StartupError::Wasm(WasmError::Trap(_)))),
        "unexpected error: {err:?}"
    );
    assert_eq!(host.registrations(), 0, "startup failure never registers");
}

#[tokio::test]
async fn start_export_runs_before_the_first_step() {
    let (engine, mut runtime) = boson_engine::bootstrap(&loader("with_start.wat"))
        .await
        .unwrap();
    assert!(engine.has_start_export());
    assert_eq!(runtime.call_i32_export("get_initialized").await.unwrap(), 1);

    let (clock, host) = ManualClock::new();
    let mut driver = FrameDriver::new(runtime, clock, DriverConfig::default());
    let host_side = async {
        fire_frames(&host, 3).await;
        wait_until(|| host.outstanding() == 1).await;
        host.close();
    };
    let (report, ()) = tokio::join!(driver.run(), host_side);

    assert_eq!(report.unwrap().stats.steps_completed, 3);
    runtime = driver.into_parts().0;
    assert_eq!(runtime.steps_completed(), 3);
}

#[tokio::test]
async fn guest_trap_on_third_step_aborts_the_driver() {
    let (clock, host) = ManualClock::new();
    let mut driver = boson_engine::launch(&loader("trap_on_third.wat"), clock, DriverConfig::default())
        .await
        .unwrap();

    let (result, ()) = tokio::join!(driver.run(), fire_frames(&host, 3));

    let err = result.unwrap_err();
    assert!(
        matches!(
            err,
            DriverError::Step {
                frame: 2,
                source: StepError::Wasm(WasmError::Trap(_))
            }
        ),
        "unexpected error: {err:?}"
    );
    assert_eq!(host.registrations(), 3);
    assert_eq!(host.outstanding(), 0);

    let (mut runtime, _) = driver.into_parts();
    assert_eq!(runtime.call_i32_export("get_count").await.unwrap(), 2);
}

#[tokio::test]
async fn guest_trap_can_be_skipped() {
    let (clock, host) = ManualClock::new();
    let config = DriverConfig {
        step_policy: StepPolicy::Skip {
            max_consecutive: Some(1),
        },
        ..Default::default()
    };
    let mut driver = boson_engine::launch(&loader("trap_on_third.wat"), clock, config)
        .await
        .unwrap();

    let (result, ()) = tokio::join!(driver.run(), fire_frames(&host, 4));

    // Frames 2 and 3 both trap: the second consecutive failure exceeds the limit.
    assert!(matches!(
        result,
        Err(DriverError::TooManySkipped { consecutive: 2, .. })
    ));
    assert_eq!(driver.stats().steps_completed, 2);
    assert_eq!(driver.stats().frames_skipped, 1);
}

#[tokio::test]
async fn runtimes_from_one_module_are_independent() {
    let (engine, mut first) = boson_engine::bootstrap(&loader("counter.wat"))
        .await
        .unwrap();
    let mut second = EngineModule::start(&engine).await.unwrap();

    let tick = FrameTick {
        index: 0,
        elapsed: Duration::ZERO,
        delta: DEFAULT_FRAME_DELTA,
    };
    for _ in 0..3 {
        RuntimeHandle::step(&mut first, &tick).await.unwrap();
    }
    RuntimeHandle::step(&mut second, &tick).await.unwrap();

    assert_eq!(first.call_i32_export("get_count").await.unwrap(), 3);
    assert_eq!(second.call_i32_export("get_count").await.unwrap(), 1);
}

#[tokio::test]
async fn frame_tick_reaches_the_guest() {
    let (clock, host) = ManualClock::new();
    let mut driver = boson_engine::launch(&loader("host_api_test.wat"), clock, DriverConfig::default())
        .await
        .unwrap();

    let host_side = async {
        fire_frames(&host, 4).await;
        wait_until(|| host.outstanding() == 1).await;
        host.close();
    };
    let (report, ()) = tokio::join!(driver.run(), host_side);
    assert_eq!(report.unwrap().exit, DriverExit::ClockClosed);

    let (mut runtime, _) = driver.into_parts();
    assert_eq!(runtime.call_i64_export("get_last_frame").await.unwrap(), 3);

    let state = runtime.host_state();
    assert_eq!(state.frame, 3);
    assert!((state.delta_time - DEFAULT_FRAME_DELTA.as_secs_f64()).abs() < 1e-9);
    assert!((state.sim_time - 4.0 * DEFAULT_FRAME_DELTA.as_secs_f64()).abs() < 1e-9);
    assert_eq!(state.log_count, 4);
}

#[tokio::test]
async fn in_memory_module_runs_with_interval_clock() {
    let wat = r#"(module (func (export "step") nop))"#;
    let loader = WasmLoader::from_bytes(wat.as_bytes(), EngineConfig::default());
    let config = DriverConfig {
        max_frames: Some(5),
        ..Default::default()
    };

    let report = boson_engine::run(&loader, IntervalClock::with_period(Duration::from_millis(1)), config)
        .await
        .unwrap();
    assert_eq!(report.exit, DriverExit::FrameLimit);
    assert_eq!(report.stats.steps_completed, 5);
}
