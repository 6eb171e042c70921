//! 热点参数流控端到端测试
//!
//! 核心是准入数的精确性：同一参数值在并发竞争下恰好放行阈值数量，
//! 不多也不少。另覆盖值间独立、突发额度的真实时序与高基数参数值。

mod common;

use admitron::prelude::*;
use admitron::in_flight_count;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_exact_admission_under_forty_threads() {
    common::init_tracing();
    let _guard = common::rule_lock();
    let resource = "e2e_param_exact";

    // Step 1: 阈值100、周期60秒(测试期间窗口不滚动)、无突发
    load_param_rules(vec![
        common::hotspot_rule(resource, 100).with_duration_secs(60)
    ])
    .unwrap();

    // Step 2: 40线程×10次, 全部争抢同一参数值
    let admitted = Arc::new(AtomicUsize::new(0));
    let denied = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..40)
        .map(|_| {
            let admitted = Arc::clone(&admitted);
            let denied = Arc::clone(&denied);
            std::thread::spawn(move || {
                for _ in 0..10 {
                    match EntryBuilder::new(resource).param("hot-key").enter() {
                        Ok(entry) => {
                            admitted.fetch_add(1, Ordering::SeqCst);
                            entry.exit().unwrap();
                        }
                        Err(err) => {
                            assert!(err.is_blocked());
                            denied.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Step 3: 恰好100次放行, 其余全拒, 无在途残留
    assert_eq!(admitted.load(Ordering::SeqCst), 100);
    assert_eq!(denied.load(Ordering::SeqCst), 300);
    assert_eq!(in_flight_count(resource), 0);

    println!("✓ E2E test passed: exactly the threshold admitted under 40 threads");
}

#[test]
fn test_values_do_not_interfere() {
    common::init_tracing();
    let _guard = common::rule_lock();
    let resource = "e2e_param_isolation";

    // Step 1: 阈值3, 周期60秒
    load_param_rules(vec![
        common::hotspot_rule(resource, 3).with_duration_secs(60)
    ])
    .unwrap();

    // Step 2: 热点值打满
    for _ in 0..3 {
        let entry = EntryBuilder::new(resource).param("busy").enter().unwrap();
        entry.exit().unwrap();
    }
    assert!(EntryBuilder::new(resource).param("busy").enter().is_err());

    // Step 3: 其他值完全不受影响
    for _ in 0..3 {
        let entry = EntryBuilder::new(resource).param("quiet").enter().unwrap();
        entry.exit().unwrap();
    }

    println!("✓ E2E test passed: one hot value never drains another value's tokens");
}

#[test]
fn test_burst_window_sequence() {
    common::init_tracing();
    let _guard = common::rule_lock();
    let resource = "e2e_param_burst";

    // Step 1: 阈值5、突发3、周期1秒
    load_param_rules(vec![common::hotspot_rule(resource, 5)
        .with_burst(3)
        .with_duration_secs(1)])
    .unwrap();

    let admit_n = |expected: u64| {
        let mut count = 0u64;
        loop {
            match EntryBuilder::new(resource).param(7i64).enter() {
                Ok(entry) => {
                    entry.exit().unwrap();
                    count += 1;
                }
                Err(_) => break,
            }
            assert!(count <= expected, "放行超过预期: {} > {}", count, expected);
        }
        count
    };

    // Step 2: 首窗口带突发放行8次
    assert_eq!(admit_n(8), 8);

    // Step 3: 紧邻滚动的窗口只有基础阈值5
    common::wait_millis(1_100);
    assert_eq!(admit_n(5), 5);

    // Step 4: 空闲两个周期后突发额度回归
    common::wait_millis(2_100);
    assert_eq!(admit_n(8), 8);

    println!("✓ E2E test passed: burst grants 8, rolls to 5, returns after idle gap");
}

#[test]
fn test_specific_items_override() {
    common::init_tracing();
    let _guard = common::rule_lock();
    let resource = "e2e_param_specific";

    // Step 1: 默认1次, vip放宽到3, blocked一律拒绝
    load_param_rules(vec![common::hotspot_rule(resource, 1)
        .with_duration_secs(60)
        .with_specific_item("vip", 3)
        .with_specific_item("blocked", 0)])
    .unwrap();

    // Step 2: vip按独立阈值放行
    for _ in 0..3 {
        let entry = EntryBuilder::new(resource).param("vip").enter().unwrap();
        entry.exit().unwrap();
    }
    assert!(EntryBuilder::new(resource).param("vip").enter().is_err());

    // Step 3: 普通值按默认阈值, blocked首次即拒
    let entry = EntryBuilder::new(resource).param("normal").enter().unwrap();
    entry.exit().unwrap();
    assert!(EntryBuilder::new(resource).param("normal").enter().is_err());
    let err = EntryBuilder::new(resource).param("blocked").enter().unwrap_err();
    assert_eq!(err.as_block().unwrap().reason, BlockReason::ParamFlow);

    println!("✓ E2E test passed: specific items override the default threshold");
}

#[test]
fn test_high_cardinality_values_stay_bounded() {
    common::init_tracing();
    let _guard = common::rule_lock();
    let resource = "e2e_param_cardinality";

    // Step 1: 每值1次, 周期60秒
    load_param_rules(vec![
        common::hotspot_rule(resource, 1).with_duration_secs(60)
    ])
    .unwrap();

    // Step 2: 远超容量上限的不同参数值逐个放行, 淘汰静默发生
    for i in 0..5_000i64 {
        let entry = EntryBuilder::new(resource).param(i).enter().unwrap();
        entry.exit().unwrap();
    }

    println!("✓ E2E test passed: high-cardinality values admit under bounded memory");
}
