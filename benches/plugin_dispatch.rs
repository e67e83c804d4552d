//! Plugin Dispatch Benchmarks
//!
//! Run with: cargo bench --bench plugin_dispatch

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use devterm_plugin::plugins::builtin::{ReversePlugin, UppercasePlugin, WordCountPlugin};
use devterm_plugin::plugins::{PluginDescriptor, PluginInput, PluginManager};
use serde_json::json;

fn text_input(text: &str) -> PluginInput {
    json!({ "text": text }).as_object().cloned().unwrap_or_default()
}

fn benchmark_execute_live(c: &mut Criterion) {
    let manager = PluginManager::new("plugins");
    manager.register_builtin(UppercasePlugin);
    manager.register_builtin(ReversePlugin);
    manager.register_builtin(WordCountPlugin);
    let input = text_input("Hello world from DevTerm");

    let mut group = c.benchmark_group("execute_live");
    group.throughput(Throughput::Elements(1));

    for name in ["uppercase", "reverse", "wordcount"] {
        group.bench_function(name, |b| {
            b.iter(|| manager.execute(black_box(name), black_box(&input)));
        });
    }

    group.bench_function("not_found", |b| {
        b.iter(|| manager.execute(black_box("missing"), black_box(&input)));
    });

    group.finish();
}

fn benchmark_load_cycle(c: &mut Criterion) {
    let manager = PluginManager::new("plugins");
    manager.register_definition(PluginDescriptor::of::<UppercasePlugin>("uppercase"));
    let input = text_input("hello");

    c.bench_function("unload_then_execute", |b| {
        b.iter(|| {
            manager.unload("uppercase");
            manager.execute(black_box("uppercase"), black_box(&input))
        });
    });
}

criterion_group!(benches, benchmark_execute_live, benchmark_load_cycle);
criterion_main!(benches);
