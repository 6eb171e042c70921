//! 热点参数流控演示
//!
//! 三个用户以不同频率访问同一资源：普通用户各限2次，vip用户有独立的
//! 放宽阈值，热点用户被限住时其余用户不受影响。
//!
//! 运行: cargo run --example param_hotspot

use admitron::prelude::*;
use std::collections::BTreeMap;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let resource = "demo/query";
    load_param_rules(vec![ParamFlowRule::new(resource, 0, 2)
        .with_duration_secs(60)
        .with_burst(1)
        .with_specific_item("vip-1001", 6)])
    .unwrap();
    println!("已加载热点参数规则: {} 每用户2次/分钟(突发+1), vip-1001放宽到6次\n", resource);

    let traffic = [
        "alice", "vip-1001", "alice", "bob", "vip-1001", "alice", "vip-1001", "bob", "alice",
        "vip-1001", "bob", "vip-1001", "vip-1001", "bob", "vip-1001",
    ];

    let mut admitted: BTreeMap<&str, u32> = BTreeMap::new();
    let mut denied: BTreeMap<&str, u32> = BTreeMap::new();

    for user in traffic {
        match EntryBuilder::new(resource).param(user).enter() {
            Ok(entry) => {
                *admitted.entry(user).or_default() += 1;
                entry.exit().unwrap();
            }
            Err(_) => {
                *denied.entry(user).or_default() += 1;
            }
        }
    }

    println!("用户\t\t放行\t拒绝");
    for user in ["alice", "bob", "vip-1001"] {
        println!(
            "{}\t{}\t{}",
            user,
            admitted.get(user).copied().unwrap_or(0),
            denied.get(user).copied().unwrap_or(0)
        );
    }

    if let Some(snapshot) = resource_snapshot(resource) {
        println!(
            "\n资源快照: pass={} block={}",
            snapshot.pass, snapshot.block
        );
    }
}
