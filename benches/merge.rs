//! Benchmarks for the merge stage
//!
//! Run: cargo bench
//! Run specific: cargo bench -- merge_pair

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array2;

use cortex_resample::core::Acquisition;
use cortex_resample::merge::{merge_pair, validate_record, LoadedSeries, DEFAULT_VALUE_BOUND};
use cortex_resample::surface::{parse_gifti, render_gifti, GiftiEncoding};
use cortex_resample::tool::FSAVERAGE4_VERTICES;

fn series(timepoints: usize, seed: f32) -> LoadedSeries {
    LoadedSeries {
        timeseries: Array2::from_shape_fn((timepoints, FSAVERAGE4_VERTICES), |(t, v)| {
            seed + (t as f32 * 0.01) - (v % 13) as f32
        }),
        filename: format!("bench_{}.func.gii", seed),
    }
}

// ============================================================================
// Hemisphere merge (HCP resting-state run lengths)
// ============================================================================

fn benchmark_merge_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_pair");
    let acq = Acquisition::new("REST1", "LR");

    for timepoints in [300usize, 1200] {
        let left = series(timepoints, 1.0);
        let right = series(timepoints - 10, 2.0);

        group.throughput(Throughput::Elements((timepoints * FSAVERAGE4_VERTICES * 2) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(timepoints), &timepoints, |b, _| {
            b.iter(|| black_box(merge_pair(&acq, black_box(&left), black_box(&right)).ok()))
        });
    }

    group.finish();
}

// ============================================================================
// Validation
// ============================================================================

fn benchmark_validation(c: &mut Criterion) {
    let acq = Acquisition::new("REST1", "LR");
    let record = match merge_pair(&acq, &series(1200, 1.0), &series(1200, 2.0)) {
        Ok(r) => r,
        Err(e) => panic!("merge failed: {:#}", e),
    };

    c.bench_function("validate_1200x5124", |b| {
        b.iter(|| black_box(validate_record(black_box(&record), DEFAULT_VALUE_BOUND)))
    });
}

// ============================================================================
// GIFTI encode/decode
// ============================================================================

fn benchmark_gifti_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("gifti");
    group.sample_size(10); // compression dominates, keep runs short

    let data = series(100, 0.5).timeseries;
    for encoding in [GiftiEncoding::Base64Binary, GiftiEncoding::GZipBase64Binary] {
        let xml = render_gifti(data.view(), &[], encoding).expect("render");

        group.bench_with_input(BenchmarkId::new("render", format!("{:?}", encoding)), &encoding, |b, &enc| {
            b.iter(|| black_box(render_gifti(data.view(), &[], enc).ok()))
        });
        group.bench_with_input(BenchmarkId::new("parse", format!("{:?}", encoding)), &xml, |b, xml| {
            b.iter(|| black_box(parse_gifti(black_box(xml)).ok()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_merge_pair,
    benchmark_validation,
    benchmark_gifti_codec,
);

criterion_main!(benches);
