//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! 参数计量
//!
//! 每条热点参数规则维护一张 参数值 -> 令牌窗口 的有界映射。映射按LRU
//! 淘汰，容量固定，在高基数参数值下内存有界；被淘汰的值再次出现时从
//! 全新窗口起步。淘汰是静默的稳态行为，不是错误。
//!
//! 令牌窗口是热点路径上竞争最激烈的单元：窗口重开走哨兵协议（恰好一个
//! 胜者清零并发布），令牌消费走单次CAS，使同一参数值上的准入/拒绝决策
//! 全局线性化。

use crate::constants::{BUCKET_RESET_IN_PROGRESS, MAX_SPIN_ITERATIONS, PARAM_METRIC_CAPACITY};
use crate::resource::ParamValue;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 单个参数值的令牌窗口
///
/// `started_ms` 为窗口起点，等于 `BUCKET_RESET_IN_PROGRESS` 时表示正在
/// 重开；`capacity` 为本窗口的有效容量，重开时由胜者根据空闲时长决定
/// 是否含突发额度。
pub struct ParamWindow {
    started_ms: AtomicU64,
    consumed: AtomicU64,
    capacity: AtomicU64,
}

impl ParamWindow {
    /// 新建窗口
    ///
    /// 参数值的首个窗口直接获得突发额度。
    fn new(now_ms: u64, threshold: u64, burst: u64) -> Self {
        Self {
            started_ms: AtomicU64::new(now_ms),
            consumed: AtomicU64::new(0),
            capacity: AtomicU64::new(threshold.saturating_add(burst)),
        }
    }

    /// 尝试在 `now_ms` 消费 `n` 个令牌
    ///
    /// 窗口到期时竞争重开：CAS抢占哨兵的胜者清零消费、决定容量并发布新
    /// 起点，败者等待后在同一个新窗口上消费。消费本身是单次CAS，冲突则
    /// 重读整个状态（窗口可能已被他人重开）。
    ///
    /// 突发额度只在窗口起点发放：距上一窗口起点至少两个完整周期（即窗口
    /// 到期后又空闲了至少一个周期）时补发，紧邻滚动的窗口只有基础阈值。
    ///
    /// # 返回
    /// - `true`: 准入，令牌已计入
    /// - `false`: 拒绝，状态未变
    pub(crate) fn try_acquire(
        &self,
        n: u64,
        now_ms: u64,
        duration_ms: u64,
        threshold: u64,
        burst: u64,
    ) -> bool {
        let mut spins = 0u64;
        loop {
            let started = self.started_ms.load(Ordering::SeqCst);

            if started == BUCKET_RESET_IN_PROGRESS {
                // 他人正在重开, 等待新起点发布
                spins += 1;
                if spins > MAX_SPIN_ITERATIONS {
                    std::thread::yield_now();
                    spins = 0;
                } else {
                    std::hint::spin_loop();
                }
                continue;
            }

            // 到期则竞争重开; 时钟回拨(started > now)沿用现有窗口
            if started <= now_ms && now_ms - started >= duration_ms {
                if self
                    .started_ms
                    .compare_exchange(
                        started,
                        BUCKET_RESET_IN_PROGRESS,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    self.consumed.store(0, Ordering::SeqCst);
                    let idle_regrant = now_ms - started >= 2 * duration_ms;
                    let cap = if idle_regrant {
                        threshold.saturating_add(burst)
                    } else {
                        threshold
                    };
                    self.capacity.store(cap, Ordering::SeqCst);
                    self.started_ms.store(now_ms, Ordering::SeqCst);
                }
                continue;
            }

            let capacity = self.capacity.load(Ordering::SeqCst);
            let current = self.consumed.load(Ordering::SeqCst);
            let wanted = current.saturating_add(n);
            if wanted > capacity {
                return false;
            }
            match self.consumed.compare_exchange(
                current,
                wanted,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(_) => continue,
            }
        }
    }

    /// 窗口起点（测试与内省）
    pub fn started_ms(&self) -> u64 {
        self.started_ms.load(Ordering::SeqCst)
    }

    /// 已消费令牌数（测试与内省）
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::SeqCst)
    }
}

/// 一条热点规则的参数计量
///
/// 参数值到令牌窗口的LRU映射，容量有界。
pub struct ParameterMetric {
    windows: Mutex<LruCache<ParamValue, Arc<ParamWindow>>>,
}

impl ParameterMetric {
    pub fn new() -> Self {
        Self::with_capacity(PARAM_METRIC_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(PARAM_METRIC_CAPACITY).expect("容量常量非零"));
        Self {
            windows: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// 取或建参数值的令牌窗口
    ///
    /// 命中提升LRU热度；未命中时新建（首个窗口含突发额度），超出容量则
    /// 淘汰最久未用的值。
    pub(crate) fn window_for(
        &self,
        value: &ParamValue,
        now_ms: u64,
        threshold: u64,
        burst: u64,
    ) -> Arc<ParamWindow> {
        let mut windows = self.windows.lock();
        if let Some(cell) = windows.get(value) {
            return cell.clone();
        }
        let cell = Arc::new(ParamWindow::new(now_ms, threshold, burst));
        windows.put(value.clone(), cell.clone());
        cell
    }

    /// 跟踪中的参数值数量
    pub fn tracked_values(&self) -> usize {
        self.windows.lock().len()
    }

    /// 是否仍跟踪该参数值（不提升热度）
    pub fn contains(&self, value: &ParamValue) -> bool {
        self.windows.lock().peek(value).is_some()
    }
}

impl Default for ParameterMetric {
    fn default() -> Self {
        Self::new()
    }
}
