//! Criterion benchmarks for deferred_logger

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use deferred_logger::core::args::ArgValue;
use deferred_logger::core::header::{HeaderContext, HeaderPattern, DEFAULT_HEADER_PATTERN};
use deferred_logger::core::template::Template;
use deferred_logger::prelude::*;
use deferred_logger::{info, info_once};
use std::time::Duration;

fn quiet_logger() -> Logger {
    Logger::builder()
        .stdout(false)
        .queue_capacity(64 * 1024 * 1024)
        .build()
        .expect("Failed to build logger")
}

// ============================================================================
// Producer Latency Benchmarks
// ============================================================================

fn bench_producer(c: &mut Criterion) {
    let mut group = c.benchmark_group("producer");
    group.throughput(Throughput::Elements(1));

    // the polling thread keeps the queue from filling up during the run
    let logger = Logger::builder()
        .stdout(false)
        .polling_interval(Duration::from_micros(100))
        .build()
        .expect("Failed to build logger");

    group.bench_function("no_args", |b| {
        b.iter(|| {
            info!(logger, "static message");
        });
    });

    group.bench_function("three_ints", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            info!(logger, "a={} b={} c={}", black_box(i), black_box(i * 2), black_box(i as i32));
        });
    });

    group.bench_function("string_arg", |b| {
        let text = String::from("a moderately long dynamic string argument");
        b.iter(|| {
            info!(logger, "text {}", black_box(&text));
        });
    });

    group.bench_function("disabled_level", |b| {
        b.iter(|| {
            deferred_logger::debug!(logger, "never enqueued {}", black_box(1));
        });
    });

    group.bench_function("once_prefiltered", |b| {
        b.iter(|| {
            info_once!(logger, "only once {}", black_box(1));
        });
    });

    group.finish();
    logger.shutdown(Duration::from_secs(5));
}

// ============================================================================
// Drain Throughput Benchmarks
// ============================================================================

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain");
    const BATCH: u64 = 1_000;
    group.throughput(Throughput::Elements(BATCH));

    let logger = quiet_logger();
    logger.set_log_callback(|msg| {
        black_box(msg.message.len());
    }, LogLevel::Debug);

    group.bench_function("poll_1000_records", |b| {
        b.iter_batched(
            || {
                for i in 0..BATCH {
                    info!(logger, "record {} value {:.3}", i, i as f64 * 0.5);
                }
            },
            |_| black_box(logger.poll(true).unwrap()),
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

// ============================================================================
// Rendering Benchmarks
// ============================================================================

fn bench_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("rendering");
    group.throughput(Throughput::Elements(1));

    let template = Template::compile("order {} side {} qty {:>8} px {:.2}");
    let args = [
        ArgValue::Uint(123456),
        ArgValue::Str("BUY"),
        ArgValue::Int(500),
        ArgValue::F64(101.25),
    ];
    group.bench_function("template", |b| {
        let mut out = String::with_capacity(128);
        b.iter(|| {
            out.clear();
            template.render(black_box(&args), &mut out).unwrap();
            black_box(out.len())
        });
    });

    let header = HeaderPattern::compile(DEFAULT_HEADER_PATTERN);
    let ctx = HeaderContext {
        timestamp_ns: 1_736_332_245_123_456_789,
        level: LogLevel::Info,
        short_location: "session.rs:120",
        full_location: "src/net/session.rs:120",
        thread_name: "main",
    };
    group.bench_function("default_header", |b| {
        let mut out = String::with_capacity(128);
        b.iter(|| {
            out.clear();
            header.render(black_box(&ctx), HeaderTimeZone::Utc, &mut out);
            black_box(out.len())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_producer, bench_drain, bench_rendering);
criterion_main!(benches);
