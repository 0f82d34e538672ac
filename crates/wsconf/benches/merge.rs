// merge.rs - Benchmarks for consolidation, overlay and the full load cycle
//
// Run with: cargo bench --bench merge
// Compare baselines: cargo bench --bench merge -- --baseline before

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Map, Value};

use wsconf::consolidate::{consolidate, FileMap};
use wsconf::merge::overlay;
use wsconf::workspace::ParsedFile;
use wsconf::{ConfigLoader, DefaultsRegistry, LoaderConfig, LoaderServices, MemoryFileSystem};

/// A tree with `sections` top-level objects of `keys` leaves each
fn synthetic_tree(sections: usize, keys: usize, salt: usize) -> Value {
    let mut root = Map::new();
    for s in 0..sections {
        let mut section = Map::new();
        for k in 0..keys {
            section.insert(format!("key{k}"), json!(s * keys + k + salt));
        }
        section.insert("list".to_string(), json!([s, salt]));
        root.insert(format!("section{s}"), Value::Object(section));
    }
    Value::Object(root)
}

fn synthetic_files(count: usize) -> FileMap {
    (0..count)
        .map(|i| {
            let path = format!(".vscode/file{i}.json");
            let file = ParsedFile::new(path.clone(), synthetic_tree(20, 10, i));
            (path, Arc::new(file))
        })
        .collect()
}

fn bench_consolidate(c: &mut Criterion) {
    let config = LoaderConfig::default();
    let mut group = c.benchmark_group("consolidate");
    for count in [1usize, 5, 25] {
        let files = synthetic_files(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &files, |b, files| {
            b.iter(|| consolidate(black_box(files), &config))
        });
    }
    group.finish();
}

fn bench_overlay(c: &mut Criterion) {
    let mut group = c.benchmark_group("overlay");
    for sections in [10usize, 100, 500] {
        let globals = synthetic_tree(sections, 20, 0);
        let workspace = synthetic_tree(sections / 2, 5, 1);
        group.bench_with_input(
            BenchmarkId::from_parameter(sections),
            &(globals, workspace),
            |b, (globals, workspace)| b.iter(|| overlay(black_box(globals), black_box(workspace))),
        );
    }
    group.finish();
}

fn bench_load_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let fs = Arc::new(MemoryFileSystem::new("file:///bench").unwrap());
    for i in 0..10 {
        let text = serde_json::to_string(&synthetic_tree(20, 10, i)).unwrap();
        fs.write(&format!(".vscode/file{i}.json"), &text);
    }
    let registry = Arc::new(DefaultsRegistry::with_defaults(synthetic_tree(100, 20, 0)));
    let loader = rt.block_on(async {
        let loader = ConfigLoader::new(
            LoaderConfig::default(),
            LoaderServices::in_memory(fs, registry),
        );
        loader.initialize().await.unwrap();
        loader
    });

    c.bench_function("load_configuration", |b| {
        b.to_async(&rt)
            .iter(|| async { loader.load_configuration(None).await.unwrap() })
    });
}

criterion_group!(benches, bench_consolidate, bench_overlay, bench_load_cycle);
criterion_main!(benches);
