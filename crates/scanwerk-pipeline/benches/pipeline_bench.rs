// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for pixel expansion and for a full page read through
// the default layer stack.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use scanwerk_backend::dumb::{DumbBackend, DumbDevice, DumbPage};
use scanwerk_backend::traits::{Api, Item, ScanSession};
use scanwerk_core::config::PipelineConfig;
use scanwerk_core::logger::Logger;
use scanwerk_core::types::{ImageFormat, ScanParameters};
use scanwerk_pipeline::RetryConfig;
use scanwerk_pipeline::layers::raw24::{expand_bw1, expand_gray8};

// ---------------------------------------------------------------------------
// Pixel expansion
// ---------------------------------------------------------------------------

fn bench_expand_gray8(c: &mut Criterion) {
    // One A4 line at 300 dpi.
    let line: Vec<u8> = (0..2550u32).map(|i| (i % 256) as u8).collect();
    let mut out = Vec::with_capacity(line.len() * 3);

    c.bench_function("raw24_expand_gray8_line", |b| {
        b.iter(|| {
            out.clear();
            expand_gray8(black_box(&line), &mut out);
            black_box(out.len());
        });
    });
}

fn bench_expand_bw1(c: &mut Criterion) {
    let width = 2550u32;
    let line: Vec<u8> = (0..width.div_ceil(8)).map(|i| (i * 37 % 256) as u8).collect();
    let mut out = Vec::with_capacity(width as usize * 3);

    c.bench_function("raw24_expand_bw1_line", |b| {
        b.iter(|| {
            out.clear();
            let mut pos = 0;
            expand_bw1(black_box(&line), width, &mut pos, &mut out);
            black_box(out.len());
        });
    });
}

// ---------------------------------------------------------------------------
// Full read through the chain
// ---------------------------------------------------------------------------

fn bench_chain_page_read(c: &mut Criterion) {
    let backend = DumbBackend::new("dumb");
    backend.add_device(
        DumbDevice::new("bench0", "Acme", "Acme Bench")
            .with_page(DumbPage::new(ScanParameters::new(ImageFormat::Grayscale8, 850, 1169)))
            .endless_feed(),
    );
    let chain = scanwerk_pipeline::build(
        backend,
        &PipelineConfig::safebet(),
        RetryConfig::default(),
        &Logger::new(),
    )
    .expect("chain");
    let source = chain
        .get_device("bench0")
        .expect("device")
        .children()
        .expect("children")
        .remove(0);
    let mut buf = vec![0u8; 32 * 1024];

    c.bench_function("chain_read_gray_page_as_rgb", |b| {
        b.iter(|| {
            let mut session = source.scan_start().expect("scan");
            let mut total = 0usize;
            while !session.end_of_page().expect("end_of_page") {
                let n = session.read(&mut buf).expect("read");
                if n == 0 {
                    break;
                }
                total += n;
            }
            session.cancel();
            black_box(total);
        });
    });
}

criterion_group!(
    benches,
    bench_expand_gray8,
    bench_expand_bw1,
    bench_chain_page_read,
);
criterion_main!(benches);
