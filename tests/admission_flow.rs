//! 准入主链路端到端测试
//!
//! 覆盖流控规则从加载、拒绝、窗口恢复到快照核对的完整链路，以及规则
//! 文档套用与兜底封装的协作。

mod common;

use admitron::prelude::*;
use admitron::{current_time_millis, find_cluster_by_name, RuleDocument};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_flow_rule_end_to_end() {
    common::init_tracing();
    let _guard = common::rule_lock();
    let resource = "e2e_flow_basic";

    // Step 1: 加载每秒2次的流控规则
    load_flow_rules(vec![common::simple_flow_rule(resource, 2.0)]).unwrap();

    // Step 2: 同一窗口内前两次放行
    for _ in 0..2 {
        let entry = enter(resource).unwrap();
        entry.exit().unwrap();
    }

    // Step 3: 第三次拒绝, 不产生在途Entry
    let err = enter(resource).unwrap_err();
    assert!(err.is_blocked());
    assert_eq!(admitron::in_flight_count(resource), 0);

    // Step 4: 窗口滚动后恢复放行
    common::wait_millis(1_100);
    let entry = enter(resource).unwrap();
    entry.exit().unwrap();

    // Step 5: 分钟窗口累计3次通过1次拒绝
    let cluster = find_cluster_by_name(resource).unwrap();
    let now = current_time_millis();
    assert_eq!(cluster.stats().window_sum(MetricEvent::Pass, 60_000, now), 3);
    assert_eq!(cluster.stats().window_sum(MetricEvent::Block, 60_000, now), 1);

    println!("✓ E2E test passed: flow rule admits, denies and recovers");
}

#[test]
fn test_rule_document_apply_and_fallback_registry() {
    common::init_tracing();
    let _guard = common::rule_lock();
    let resource = "e2e_rule_document";

    // Step 1: 通过YAML文档声明拒绝一切的流控规则
    let yaml = format!(
        r#"
flow:
  - resource: "{}"
    threshold: 0.0
"#,
        resource
    );
    RuleDocument::from_yaml_str(&yaml).unwrap().apply().unwrap();

    // Step 2: 注册资源级兜底回调
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    set_resource_fallback(resource, move |_identity, cause| {
        assert!(cause.is_blocked());
        seen.fetch_add(1, Ordering::SeqCst);
        serde_json::json!("cached")
    });

    // Step 3: guarded拒绝时先执行注册回调, 替代结果来自调用侧闭包
    let result: Result<&str, &str> = guarded(
        resource,
        || Ok("real"),
        |cause| {
            assert!(cause.is_blocked());
            Ok("fallback")
        },
    );
    assert_eq!(result, Ok("fallback"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Step 4: guarded_value直接采用注册回调的替代值
    let substituted = guarded_value(resource, || Ok(serde_json::json!("real"))).unwrap();
    assert_eq!(substituted, serde_json::json!("cached"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    remove_resource_fallback(resource);
    println!("✓ E2E test passed: rule document applies and fallback registry substitutes");
}

#[test]
fn test_origin_scoped_flow_rule() {
    common::init_tracing();
    let _guard = common::rule_lock();
    let resource = "e2e_flow_origin";

    // Step 1: 只约束gateway来源的规则
    load_flow_rules(vec![
        FlowRule::new(resource, 2.0).with_limit_origin("gateway")
    ])
    .unwrap();

    // Step 2: gateway放行2次后第3次拒绝
    for _ in 0..2 {
        let entry = EntryBuilder::new(resource)
            .origin("gateway")
            .enter()
            .unwrap();
        entry.exit().unwrap();
    }
    assert!(EntryBuilder::new(resource)
        .origin("gateway")
        .enter()
        .is_err());

    // Step 3: 其他来源不受该规则约束
    for _ in 0..3 {
        let entry = EntryBuilder::new(resource).origin("mobile").enter().unwrap();
        entry.exit().unwrap();
    }

    println!("✓ E2E test passed: origin-scoped rule limits only the named caller");
}

#[test]
fn test_batch_count_admission() {
    common::init_tracing();
    let _guard = common::rule_lock();
    let resource = "e2e_flow_batch";

    // Step 1: 每秒10次的规则, 批量8先到
    load_flow_rules(vec![common::simple_flow_rule(resource, 10.0)]).unwrap();
    let entry = EntryBuilder::new(resource).batch_count(8).enter().unwrap();
    entry.exit().unwrap();

    // Step 2: 剩余容量2, 批量3拒绝而批量2放行
    assert!(EntryBuilder::new(resource).batch_count(3).enter().is_err());
    let entry = EntryBuilder::new(resource).batch_count(2).enter().unwrap();
    entry.exit().unwrap();

    println!("✓ E2E test passed: batch admission counts against window capacity");
}

#[test]
fn test_exception_recorded_through_guarded() {
    common::init_tracing();
    let resource = "e2e_guarded_exception";

    // Step 1: 受保护体失败, 错误原样返回
    let failed: Result<u32, String> = guarded(resource, || Err("db down".into()), |_| Ok(0));
    assert_eq!(failed, Err("db down".to_string()));

    // Step 2: 异常计入资源统计
    let cluster = find_cluster_by_name(resource).unwrap();
    let now = current_time_millis();
    assert_eq!(
        cluster
            .stats()
            .window_sum(MetricEvent::Exception, 60_000, now),
        1
    );
    assert_eq!(cluster.stats().window_sum(MetricEvent::Pass, 60_000, now), 1);

    println!("✓ E2E test passed: guarded body failure lands in exception counters");
}
