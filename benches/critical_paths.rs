//! Criterion benchmarks for assetpipe critical paths
//!
//! Benchmarks the operations every URL query and dirty check goes through:
//! - Prediction: names-only pass over a pipeline
//! - Identity: stage fingerprints and the input digest
//! - Fingerprint stripping used by request routing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use assetpipe::fingerprint::{
    add_fingerprint, pipeline_input_hash, strip_fingerprint, InputMode, StageFingerprint,
};
use assetpipe::pipeline::Pipeline;
use assetpipe::stage::{Gather, InputSource, InputSpec, Output};
use assetpipe::storage::MemoryStorage;
use std::fs;
use tempfile::TempDir;

// =============================================================================
// Test Data Generators
// =============================================================================

/// A directory holding `n` small stylesheets.
fn make_sources(n: usize) -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("css")).unwrap();
    for i in 0..n {
        fs::write(temp.path().join(format!("css/part{:04}.css", i)), format!(".c{} {{ color: red }}", i))
            .unwrap();
    }
    temp
}

fn make_pipeline(temp: &TempDir) -> Pipeline {
    let gather = Gather::new(temp.path(), vec![InputSpec::path("css/*.css")], InputMode::Mtime).unwrap();
    Pipeline::builder("css", gather)
        .bundle("site.css")
        .hash_names()
        .output(Output::new(Box::new(MemoryStorage::new())))
}

// =============================================================================
// Prediction
// =============================================================================

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("prediction");

    for count in [10, 100, 500] {
        let temp = make_sources(count);
        let pipeline = make_pipeline(&temp);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("expected_output_names", count), &pipeline, |b, p| {
            b.iter(|| black_box(p.expected_output_names().unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("is_dirty", count), &pipeline, |b, p| {
            b.iter(|| black_box(p.is_dirty().unwrap()))
        });
    }

    group.finish();
}

// =============================================================================
// Identity
// =============================================================================

fn bench_identity(c: &mut Criterion) {
    let mut group = c.benchmark_group("identity");

    group.bench_function("stage_fingerprint", |b| {
        b.iter(|| {
            black_box(
                StageFingerprint::new("Sass")
                    .arg("--stdin")
                    .arg("--style=compressed")
                    .option("load_paths", "vendor/scss")
                    .finish(),
            )
        })
    });

    let temp = make_sources(100);
    let inputs: Vec<InputSource> =
        (0..100).map(|i| InputSource::file(format!("css/part{:04}.css", i))).collect();
    for mode in [InputMode::Mtime, InputMode::Content] {
        group.bench_with_input(BenchmarkId::new("input_hash", mode), &mode, |b, &mode| {
            b.iter(|| black_box(pipeline_input_hash(&inputs, temp.path(), mode)))
        });
    }

    group.finish();
}

// =============================================================================
// Routing
// =============================================================================

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");

    let names = [
        "site.0123456789abcdef.css",
        "js/app.min.js",
        "vendor/lib.fedcba9876543210.min.js",
        "no-extension",
    ];
    group.bench_function("strip_fingerprint", |b| {
        b.iter(|| {
            for name in &names {
                black_box(strip_fingerprint(name));
            }
        })
    });
    group.bench_function("add_fingerprint", |b| {
        b.iter(|| black_box(add_fingerprint("vendor/lib.min.js", "0123456789abcdef")))
    });

    group.finish();
}

criterion_group!(benches, bench_prediction, bench_identity, bench_routing);
criterion_main!(benches);
