//! Step overhead benchmarks.
//!
//! Measures the cost of one `step()` round trip through the async Wasmtime
//! call path, with and without host imports, and the cost of starting a new
//! runtime from an already-loaded engine.
//!
//! Run with: `cargo bench --bench step_benchmarks`

use boson_host::{EngineConfig, WasmEngine};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Load a WAT/WASM fixture from the tests/fixtures directory.
fn fixture_bytes(name: &str) -> Vec<u8> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(&path)
        .unwrap_or_else(|e| panic!("failed to read fixture {}: {}", path.display(), e))
}

fn current_thread_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("tokio runtime should build")
}

/// Baseline: raw async call overhead of an empty step.
fn bench_noop_step(c: &mut Criterion) {
    let rt = current_thread_runtime();
    let engine = WasmEngine::from_bytes(&EngineConfig::default(), &fixture_bytes("noop.wat"))
        .expect("noop.wat should compile");
    let mut runtime = rt.block_on(engine.start()).expect("noop.wat should start");

    let mut frame = 0u64;
    c.bench_function("noop_step", |b| {
        b.iter(|| {
            frame += 1;
            let fuel = rt
                .block_on(runtime.step(frame, 0.0, 1.0 / 60.0))
                .expect("step should not trap");
            black_box(fuel);
        });
    });
}

/// A step that calls each of the four `"boson"` imports once.
fn bench_host_api_step(c: &mut Criterion) {
    let rt = current_thread_runtime();
    let engine =
        WasmEngine::from_bytes(&EngineConfig::default(), &fixture_bytes("host_api_test.wat"))
            .expect("host_api_test.wat should compile");
    let mut runtime = rt.block_on(engine.start()).expect("host_api_test.wat should start");

    let mut frame = 0u64;
    c.bench_function("host_api_step", |b| {
        b.iter(|| {
            frame += 1;
            let fuel = rt
                .block_on(runtime.step(frame, 0.0, 1.0 / 60.0))
                .expect("step should not trap");
            black_box(fuel);
        });
    });
}

/// Cost of `start()` on a pre-linked engine (fresh store + instantiate).
fn bench_start_runtime(c: &mut Criterion) {
    let rt = current_thread_runtime();
    let engine = WasmEngine::from_bytes(&EngineConfig::default(), &fixture_bytes("with_start.wat"))
        .expect("with_start.wat should compile");

    c.bench_function("start_runtime", |b| {
        b.iter(|| {
            let runtime = rt.block_on(engine.start()).expect("start should succeed");
            black_box(runtime.steps_completed());
        });
    });
}

criterion_group!(
    benches,
    bench_noop_step,
    bench_host_api_step,
    bench_start_runtime
);
criterion_main!(benches);
