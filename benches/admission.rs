//! 准入路径基准测试
//!
//! 测试滑动窗口计数与三类规则检查在热路径上的开销

use admitron::prelude::*;
use admitron::current_time_millis;
use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput,
};

/// 基准测试：滑动窗口计数器读写
fn bench_sliding_counter(c: &mut Criterion) {
    let counter = SlidingCounter::per_second();
    let mut group = c.benchmark_group("sliding_counter");
    group.throughput(Throughput::Elements(1));

    group.bench_function("record", |b| {
        b.iter(|| {
            counter.record(
                black_box(MetricEvent::Pass),
                black_box(1),
                current_time_millis(),
            );
        });
    });

    group.bench_function("window_sum", |b| {
        b.iter(|| {
            black_box(counter.window_sum(MetricEvent::Pass, 1_000, current_time_millis()));
        });
    });

    group.finish();
}

/// 基准测试：完整进入/退出生命周期
fn bench_entry_lifecycle(c: &mut Criterion) {
    load_flow_rules(vec![
        FlowRule::new("bench/ruled", 1e12),
        FlowRule::new("bench/denied", 0.0),
    ])
    .unwrap();

    let mut group = c.benchmark_group("entry_lifecycle");
    group.throughput(Throughput::Elements(1));

    group.bench_function("no_rules", |b| {
        b.iter(|| {
            let entry = enter(black_box("bench/bare")).unwrap();
            entry.exit().unwrap();
        });
    });

    group.bench_function("flow_rule_admit", |b| {
        b.iter(|| {
            let entry = enter(black_box("bench/ruled")).unwrap();
            entry.exit().unwrap();
        });
    });

    group.bench_function("flow_rule_deny", |b| {
        b.iter(|| {
            let denied = enter(black_box("bench/denied"));
            assert!(black_box(denied).is_err());
        });
    });

    group.finish();
}

/// 基准测试：热点参数检查随参数值基数的变化
fn bench_param_admission(c: &mut Criterion) {
    load_param_rules(vec![ParamFlowRule::new("bench/param", 0, u64::MAX / 2)
        .with_duration_secs(60)])
    .unwrap();

    let mut group = c.benchmark_group("param_admission");

    for cardinality in [1i64, 100, 10_000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(cardinality),
            cardinality,
            |b, &cardinality| {
                let mut next = 0i64;
                b.iter(|| {
                    next = (next + 1) % cardinality;
                    let entry = EntryBuilder::new("bench/param")
                        .param(black_box(next))
                        .enter()
                        .unwrap();
                    entry.exit().unwrap();
                });
            },
        );
    }

    group.finish();
}

/// 基准测试：熔断检查在关闭状态下的开销
fn bench_degrade_closed_path(c: &mut Criterion) {
    load_degrade_rules(vec![DegradeRule::new(
        "bench/degrade",
        DegradeGrade::ExceptionRatio,
        0.99,
    )
    .with_time_window_secs(10)
    .with_min_request_amount(u64::MAX / 2)])
    .unwrap();

    let mut group = c.benchmark_group("degrade_closed");
    group.throughput(Throughput::Elements(1));
    group.bench_function("admit", |b| {
        b.iter(|| {
            let entry = enter(black_box("bench/degrade")).unwrap();
            entry.exit().unwrap();
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_sliding_counter,
    bench_entry_lifecycle,
    bench_param_admission,
    bench_degrade_closed_path
);
criterion_main!(benches);
