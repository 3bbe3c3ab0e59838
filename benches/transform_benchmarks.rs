use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fotokit::{
    config::{BilateralConfig, ClaheConfig, CompressionConfig, EnhancementConfig},
    transforms::enhance::{bilateral_filter, equalize_lightness},
    Compressor, Enhancer,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

const SIZES: [u32; 3] = [256, 512, 1024];

fn photo(side: u32) -> RgbImage {
    RgbImage::from_fn(side, side, |x, y| {
        let wave = ((x as f32 / 17.0).sin() * 40.0 + (y as f32 / 23.0).cos() * 40.0) as i32;
        let base = ((x + y) * 255 / (2 * side)) as i32;
        let v = (base + wave).clamp(0, 255) as u8;
        Rgb([v, v.wrapping_add((x % 13) as u8), 255 - v])
    })
}

fn bench_clahe(c: &mut Criterion) {
    let mut group = c.benchmark_group("clahe");
    let config = ClaheConfig::default();
    for side in SIZES {
        let image = photo(side);
        group.bench_with_input(BenchmarkId::from_parameter(side), &image, |b, image| {
            b.iter(|| equalize_lightness(black_box(image), &config));
        });
    }
    group.finish();
}

fn bench_bilateral(c: &mut Criterion) {
    let mut group = c.benchmark_group("bilateral");
    group.sample_size(10);
    let config = BilateralConfig::default();
    for side in SIZES {
        let image = photo(side);
        group.bench_with_input(BenchmarkId::from_parameter(side), &image, |b, image| {
            b.iter(|| bilateral_filter(black_box(image), &config));
        });
    }
    group.finish();
}

fn bench_pipelines(c: &mut Criterion) {
    let image = DynamicImage::ImageRgb8(photo(512));
    let enhancer = Enhancer::new(EnhancementConfig::default());
    let compressor = Compressor::new(CompressionConfig::default());

    c.bench_function("enhance_512", |b| {
        b.iter(|| enhancer.enhance_or_original(black_box(&image)));
    });
    c.bench_function("compress_jpeg_512", |b| {
        b.iter(|| compressor.compress(black_box(&image), ImageFormat::Jpeg));
    });
}

criterion_group!(benches, bench_clahe, bench_bilateral, bench_pipelines);
criterion_main!(benches);
