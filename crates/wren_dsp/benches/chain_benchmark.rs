//! Performance benchmarks for the processing path
//!
//! Run with: cargo bench -p wren_dsp

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use wren_dsp::{plugin_chain, Equalizer, NullHost, ParamValue, DEFAULT_NOTICE_CAPACITY};

fn benchmark_eq_processing(c: &mut Criterion) {
    let mut group = c.benchmark_group("equalizer");

    for size in [64, 128, 256, 512, 1024] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("process_planar_{}_frames", size), |b| {
            let mut eq = Equalizer::new(48000.0);
            for band in 0..10 {
                eq.set_band_gain(band, 3.0);
            }
            let mut left: Vec<f32> = (0..size).map(|i| (i as f32 * 0.001).sin()).collect();
            let mut right: Vec<f32> = (0..size).map(|i| (i as f32 * 0.002).sin()).collect();

            b.iter(|| {
                eq.process_planar(black_box(&mut left), black_box(&mut right));
            });
        });
    }

    group.finish();
}

fn benchmark_chain_processing(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain");

    for size in [64, 256, 1024] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("equalizer_limiter_{}_frames", size), |b| {
            let (mut chain, mut handle) = plugin_chain(Arc::new(NullHost), DEFAULT_NOTICE_CAPACITY);
            handle.prepare(48000, size).unwrap();
            handle.set_units(&["equalizer", "limiter"]).unwrap();
            handle
                .unit("equalizer")
                .unwrap()
                .bind("band3-gain", &ParamValue::Float(6.0))
                .unwrap();

            let in_l: Vec<f32> = (0..size).map(|i| (i as f32 * 0.001).sin()).collect();
            let in_r: Vec<f32> = (0..size).map(|i| (i as f32 * 0.002).sin()).collect();
            let mut out_l = vec![0.0; size];
            let mut out_r = vec![0.0; size];

            b.iter(|| {
                chain.process_block(
                    black_box(&in_l),
                    black_box(&in_r),
                    black_box(&mut out_l),
                    black_box(&mut out_r),
                );
                handle.drain_notices();
            });
        });
    }

    group.finish();
}

fn benchmark_parameter_bind(c: &mut Criterion) {
    c.bench_function("unit_bind_parameter", |b| {
        let (_chain, mut handle) = plugin_chain(Arc::new(NullHost), DEFAULT_NOTICE_CAPACITY);
        handle.set_units(&["equalizer"]).unwrap();
        let unit = Arc::clone(handle.unit("equalizer").unwrap());
        let mut gain = 0.0;

        b.iter(|| {
            unit.bind("band0-gain", &ParamValue::Float(gain)).unwrap();
            gain = (gain + 1.0) % 24.0;
        });
    });
}

criterion_group!(
    benches,
    benchmark_eq_processing,
    benchmark_chain_processing,
    benchmark_parameter_bind
);

criterion_main!(benches);
