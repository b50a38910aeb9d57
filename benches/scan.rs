//! Scanning Benchmarks
//!
//! # Running Benchmarks
//! ```bash
//! cargo bench --bench scan
//! ```
//!
//! # Metrics Measured
//! - Integral image construction per resolution
//! - Full multi-scale scan per resolution and accumulator type
//! - Feature rescaling per scale step

use cascade_scan::{
    Accumulator, ClassifierCascade, ClassifierCascadeBuilder, FeatureKind, GrayImage, IntegralImage,
    RectFeature, Scanner, ScannerConfig, Sign, Stride, StrongClassifier, WeakClassifier, VARIANTS,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

/// Textured grayscale image so the cascade does not reject everything at once.
fn create_test_image(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| ((x * 7 + y * 11) % 256) as u8)
}

/// Three stages of growing size drawing on every feature variant.
fn create_cascade() -> ClassifierCascade {
    let mut builder = ClassifierCascadeBuilder::new("bench").template_size(24, 24);
    let mut variants = VARIANTS.iter().cycle();
    for (i, weak_count) in [2usize, 5, 10].into_iter().enumerate() {
        let mut stage = StrongClassifier::new(0.5).unwrap();
        for j in 0..weak_count {
            let (kind, stride) = *variants.next().unwrap();
            let mut feature = RectFeature::new(kind, stride, 24, 24).unwrap();
            feature.set_to_incarnation((i * 97 + j * 13) as u128 % feature.num_incarnations());
            let sign = if j % 2 == 0 { Sign::Less } else { Sign::GreaterOrEqual };
            stage.add_weak_classifier(WeakClassifier::new(feature, sign, 0.0, 0.0), 1.0);
        }
        builder = builder.add_stage(stage);
    }
    builder.build().unwrap()
}

fn bench_integral<T: Accumulator>(c: &mut Criterion, label: &str) {
    let mut group = c.benchmark_group(format!("integral_{}", label));
    group.warm_up_time(Duration::from_secs(1));

    for (width, height) in [(640, 480), (320, 240)] {
        let image = create_test_image(width, height);
        let mut ii = IntegralImage::<T>::new();
        group.throughput(Throughput::Elements((width * height) as u64));
        group.bench_with_input(
            BenchmarkId::new("create_from", format!("{}x{}", width, height)),
            &image,
            |b, image| b.iter(|| ii.create_from(black_box(image), true).unwrap()),
        );
    }

    group.finish();
}

fn bench_integral_all(c: &mut Criterion) {
    bench_integral::<f64>(c, "f64");
    bench_integral::<u32>(c, "u32");
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));

    let config = ScannerConfig {
        translation_inc_x: 2,
        translation_inc_y: 2,
        ..ScannerConfig::default()
    };

    for (width, height) in [(320, 240), (160, 120)] {
        let image = create_test_image(width, height);
        let mut cascade = create_cascade();

        let mut scanner = Scanner::new(config.clone()).unwrap();
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("f64", format!("{}x{}", width, height)),
            &image,
            |b, image| b.iter(|| black_box(scanner.scan(&mut cascade, black_box(image)).unwrap())),
        );

        let mut scanner = Scanner::<u32>::with_accumulator(config.clone()).unwrap();
        group.bench_with_input(
            BenchmarkId::new("u32", format!("{}x{}", width, height)),
            &image,
            |b, image| b.iter(|| black_box(scanner.scan(&mut cascade, black_box(image)).unwrap())),
        );
    }

    group.finish();
}

fn bench_rescale(c: &mut Criterion) {
    let mut cascade = create_cascade();
    c.bench_function("scale_features_evenly", |b| {
        b.iter(|| {
            for w in [24, 29, 35, 41, 50, 60] {
                let s = w as f64 / 24.0;
                cascade.scale_features_evenly(s, s, w, w).unwrap();
            }
        })
    });
}

fn bench_enumeration(c: &mut Criterion) {
    c.bench_function("enumerate_left_right_24x24", |b| {
        b.iter(|| {
            let mut feature = RectFeature::new(FeatureKind::LeftRight, Stride::Normal, 24, 24).unwrap();
            let mut n = 1u64;
            while feature.set_to_next_incarnation() {
                n += 1;
            }
            black_box(n)
        })
    });
}

criterion_group!(
    benches,
    bench_integral_all,
    bench_scan,
    bench_rescale,
    bench_enumeration
);
criterion_main!(benches);
