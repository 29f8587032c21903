//! Call overhead of bound functions, measured through the in-process runtime.
//!
//! Each benchmark calls one function of the sample extension the way managed
//! code would, so the numbers cover dispatch, the trampoline and marshaling in
//! both directions.
//!
//! ## Profiling with Puffin
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

#[path = "../tests/harness/mod.rs"]
mod harness;

use harness::{call, env};
use ktbind_vm::{PrimArray, Val};

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

fn primitive_calls(c: &mut Criterion) {
    setup_profiler();
    let env = env();

    let mut group = c.benchmark_group("primitives");
    group.bench_function("add_ints", |b| {
        b.iter(|| {
            let sum = call(&env, "add", &[black_box(Val::Int(20)), Val::Int(22)]);
            end_profiling_frame();
            sum
        })
    });
    group.bench_function("echo_double", |b| {
        b.iter(|| call(&env, "echoDouble", &[black_box(Val::Double(0.5))]))
    });
    group.finish();
}

fn string_calls(c: &mut Criterion) {
    setup_profiler();
    let env = env();
    let text = "x".repeat(1024);
    let arg = Val::Obj(env.new_string(&text));

    let mut group = c.benchmark_group("strings");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("echo_1k", |b| {
        b.iter(|| {
            let echoed = call(&env, "echoString", &[black_box(arg)]);
            end_profiling_frame();
            echoed
        })
    });
    group.finish();
}

fn collection_calls(c: &mut Criterion) {
    setup_profiler();
    let env = env();

    let items: Vec<_> = (0..100)
        .map(|i| Some(env.new_string(&format!("item{}", i))))
        .collect();
    let list = Val::Obj(env.new_list(&items).expect("list"));
    let array = Val::Obj(env.new_array(PrimArray::Int((0..1000).collect())));

    let mut group = c.benchmark_group("collections");
    group.throughput(Throughput::Elements(items.len() as u64));
    group.bench_function("reverse_100_strings", |b| {
        b.iter(|| {
            let reversed = call(&env, "reverse", &[black_box(list)]);
            end_profiling_frame();
            reversed
        })
    });
    group.throughput(Throughput::Elements(1000));
    group.bench_function("double_1000_ints", |b| {
        b.iter(|| call(&env, "doubled", &[black_box(array)]))
    });
    group.finish();
}

fn data_class_calls(c: &mut Criterion) {
    setup_profiler();
    let env = env();
    let data = call(&env, "makeData", &[]).expect("data");

    let mut group = c.benchmark_group("data_classes");
    group.bench_function("echo_data", |b| {
        b.iter(|| {
            let copy = call(&env, "echoData", &[black_box(data)]);
            end_profiling_frame();
            copy
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    primitive_calls,
    string_calls,
    collection_calls,
    data_class_calls
);
criterion_main!(benches);
