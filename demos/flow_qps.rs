//! QPS流控演示
//!
//! 对同一资源持续施压三秒，观察每秒恰好放行阈值数量、其余被拒，以及
//! 熔断规则在后端持续失败时接管流量。
//!
//! 运行: cargo run --example flow_qps

use admitron::prelude::*;
use std::time::{Duration, Instant};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let resource = "demo/search";
    load_flow_rules(vec![FlowRule::new(resource, 5.0)]).unwrap();
    println!("已加载流控规则: {} 每秒5次\n", resource);

    for second in 1..=3 {
        let started = Instant::now();
        let mut admitted = 0u32;
        let mut denied = 0u32;

        while started.elapsed() < Duration::from_secs(1) {
            match enter(resource) {
                Ok(entry) => {
                    admitted += 1;
                    entry.exit().unwrap();
                }
                Err(_) => denied += 1,
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        println!("第{}秒: 放行 {} 次, 拒绝 {} 次", second, admitted, denied);
    }

    if let Some(snapshot) = resource_snapshot(resource) {
        println!(
            "\n当前窗口快照: pass={} block={} pass_qps={:.1}",
            snapshot.pass, snapshot.block, snapshot.pass_qps
        );
    }

    println!("\n======== 熔断演示 ========");
    let backend = "demo/flaky-backend";
    load_degrade_rules(vec![DegradeRule::new(
        backend,
        DegradeGrade::ExceptionRatio,
        0.5,
    )
    .with_time_window_secs(2)
    .with_min_request_amount(3)])
    .unwrap();

    for round in 1..=8 {
        let result: Result<&str, String> = guarded(
            backend,
            || {
                if round <= 4 {
                    Err("backend unavailable".to_string())
                } else {
                    Ok("ok")
                }
            },
            |cause| {
                println!("第{}次调用走兜底: {}", round, cause);
                Ok("cached-fallback")
            },
        );
        println!("第{}次调用结果: {:?}", round, result);
        std::thread::sleep(Duration::from_millis(200));
    }

    println!("\n等待熔断窗口过去...");
    std::thread::sleep(Duration::from_millis(2_200));
    let recovered: Result<&str, String> = guarded(backend, || Ok("ok"), |_| Ok("fallback"));
    println!("恢复后的调用结果: {:?}", recovered);
}
