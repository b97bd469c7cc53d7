#![allow(
    clippy::tests_outside_test_module,
    clippy::unwrap_used,
    reason = "benchmark"
)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use templet::{Context, Engine, Template, Value};

mod utils;

fn templet_benchmark(c: &mut Criterion) {
    let engine = Engine::new();

    // Parse the shared template once
    let template = Template::new(utils::PROFILE_TEMPLATE);

    // Generate 100 random contexts
    let json_contexts = utils::generate_random_contexts(100);

    // Convert JSON contexts to templet contexts
    let contexts: Vec<Context> = json_contexts.iter().map(create_context).collect();

    // Print binary size information
    utils::print_binary_size();

    // Setup benchmark group
    let mut group = c.benchmark_group("Template Rendering");
    group.sample_size(50);

    // Benchmark rendering a parsed template
    group.bench_function("templet_render", |b| {
        b.iter(|| {
            for context in &contexts {
                black_box(template.render(context, &engine).unwrap());
            }
        });
    });

    // Benchmark parsing and rendering together
    group.bench_function("templet_parse_and_render", |b| {
        b.iter(|| {
            for context in &contexts {
                black_box(engine.render_str(utils::PROFILE_TEMPLATE, context).unwrap());
            }
        });
    });

    group.finish();
}

// Convert JSON data to a templet context
fn create_context(json: &serde_json::Value) -> Context {
    if let Value::Map(map) = to_value(json) {
        Context::from(map)
    } else {
        Context::new()
    }
}

fn to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map_or_else(|| Value::Float(n.as_f64().unwrap_or_default()), Value::Int),
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(items) => Value::Seq(items.iter().map(to_value).collect()),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(key, value)| (key.as_str(), to_value(value)))
            .collect(),
    }
}

criterion_group!(benches, templet_benchmark);
criterion_main!(benches);
