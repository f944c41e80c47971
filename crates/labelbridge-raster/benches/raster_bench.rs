// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the raster encoder.  The 56 x 31 mm label is the
// common shipping-label case; the photo-sized source exercises the
// downscale path that dominates when front-ends send canvas screenshots.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use labelbridge_raster::{DotSize, LabelProgram, RasterEncoder, sample_label};

fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let v = ((x + y) % 256) as u8;
        Rgba([v, v, v, 255])
    });
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
        .expect("encode PNG");
    buffer
}

fn bench_encode_shipping_label(c: &mut Criterion) {
    let png = sample_label(56.0, 31.0).expect("sample label");
    let encoder = RasterEncoder::new().with_size_commands(true);

    c.bench_function("encode 56x31mm sample label", |b| {
        b.iter(|| black_box(encoder.encode(black_box(&png), 56.0, 31.0).expect("encode")));
    });
}

fn bench_encode_downscale(c: &mut Criterion) {
    let png = gradient_png(1600, 900);
    let decoded = image::load_from_memory(&png).expect("decode");
    let encoder = RasterEncoder::new();

    c.bench_function("encode_image 1600x900 -> 100x50mm", |b| {
        b.iter(|| black_box(encoder.encode_image(black_box(&decoded), DotSize::new(800, 400))));
    });
}

fn bench_program_copies(c: &mut Criterion) {
    let png = sample_label(56.0, 31.0).expect("sample label");
    let raster = RasterEncoder::new().encode(&png, 56.0, 31.0).expect("encode");

    c.bench_function("label program, 10 copies", |b| {
        b.iter(|| black_box(LabelProgram::from_raster(black_box(&raster), 10, true).to_bytes()));
    });
}

criterion_group!(
    benches,
    bench_encode_shipping_label,
    bench_encode_downscale,
    bench_program_copies
);
criterion_main!(benches);
