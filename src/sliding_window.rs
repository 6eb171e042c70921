//! 滑动窗口计数器
//!
//! 实现按时间分桶的并发计数器，支撑资源级统计与规则判定。
//!
//! # 特性
//!
//! - **原地复用**: 固定数量的桶按时间取模复用，内存恒定
//! - **无锁热路径**: 计数使用 fetch_add，过期桶回收使用 CAS 哨兵协议
//! - **时钟跳变安全**: 大幅前跳按到期起点一次性回收（O(1)），回拨沿用现有桶
//! - **使用 SeqCst 内存序确保并发安全**
//!
//! # 回收协议
//!
//! 桶的 `window_start` 有三种状态：正常起点、过期起点、回收哨兵。写者发现
//! 过期起点后以 CAS 抢占（起点 -> 哨兵），胜者清零计数并发布新起点，败者
//! 自旋等待后在新窗口上计数。旧周期的残留值因此不可能泄漏进新周期。

use crate::clock::current_time_millis;
use crate::constants::{
    BUCKET_RESET_IN_PROGRESS, DEFAULT_INTERVAL_MS, DEFAULT_SAMPLE_COUNT, MAX_SPIN_ITERATIONS,
    MS_PER_SECOND,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// 统计事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricEvent {
    /// 放行
    Pass,
    /// 拒绝
    Block,
    /// 业务异常
    Exception,
    /// 成功完成
    Success,
    /// 响应时间累计（毫秒）
    RtSum,
}

/// 事件种类数（桶内计数槽位数）
const EVENT_KINDS: usize = 5;

impl MetricEvent {
    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// 单个时间桶
///
/// `window_start` 为桶覆盖区间的起点毫秒数；等于 `BUCKET_RESET_IN_PROGRESS`
/// 时表示桶正在被某个写者回收清零。
struct Bucket {
    window_start: AtomicU64,
    counters: [AtomicU64; EVENT_KINDS],
}

impl Bucket {
    fn new() -> Self {
        Self {
            // 起点0恒为过期，首个写者直接走回收路径完成初始化
            window_start: AtomicU64::new(0),
            counters: Default::default(),
        }
    }
}

/// 滑动窗口计数器
///
/// 将 `interval_ms` 均分为 `sample_count` 个桶，按事件类型计数并支持
/// 任意窗口长度（不超过总区间）的求和查询。
///
/// # 示例
/// ```rust
/// use admitron::sliding_window::{MetricEvent, SlidingCounter};
///
/// let counter = SlidingCounter::new(2, 1000);
/// counter.record(MetricEvent::Pass, 1, 1_700_000_000_000);
/// let passed = counter.window_sum(MetricEvent::Pass, 1000, 1_700_000_000_000);
/// assert_eq!(passed, 1);
/// ```
pub struct SlidingCounter {
    /// 每桶覆盖的毫秒数
    bucket_len_ms: u64,
    /// 桶数量
    sample_count: usize,
    /// 总区间毫秒数（bucket_len_ms * sample_count）
    interval_ms: u64,
    /// 桶数组，按 (at / bucket_len) % sample_count 取址
    buckets: Vec<Bucket>,
}

impl SlidingCounter {
    /// 创建计数器
    ///
    /// # 参数
    /// - `sample_count`: 桶数量，至少为1
    /// - `interval_ms`: 总区间毫秒数，应能被桶数量整除
    pub fn new(sample_count: usize, interval_ms: u64) -> Self {
        let sample_count = sample_count.max(1);
        let bucket_len_ms = (interval_ms / sample_count as u64).max(1);
        let interval_ms = bucket_len_ms * sample_count as u64;

        let buckets = (0..sample_count).map(|_| Bucket::new()).collect();

        Self {
            bucket_len_ms,
            sample_count,
            interval_ms,
            buckets,
        }
    }

    /// 秒级默认配置（2个500ms桶，1秒区间）
    pub fn per_second() -> Self {
        Self::new(DEFAULT_SAMPLE_COUNT, DEFAULT_INTERVAL_MS)
    }

    /// 分钟级配置（60个1秒桶，60秒区间）
    pub fn per_minute() -> Self {
        Self::new(60, 60 * MS_PER_SECOND)
    }

    /// 总区间毫秒数
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// 记录事件
    ///
    /// 将 `amount` 累加到覆盖 `at_ms` 的桶上。桶过期时先完成回收协议。
    pub fn record(&self, event: MetricEvent, amount: u64, at_ms: u64) {
        let bucket = self.position_bucket(at_ms);
        bucket.counters[event.index()].fetch_add(amount, Ordering::SeqCst);
    }

    /// 以当前时刻记录事件
    pub fn add(&self, event: MetricEvent, amount: u64) {
        self.record(event, amount, current_time_millis());
    }

    /// 窗口求和
    ///
    /// 返回 `[at_ms - window_ms, at_ms]` 内各桶该事件的总量。比 `window_ms`
    /// 更老的桶确定性地被排除；正在回收的桶与起点在 `at_ms` 之后的桶跳过。
    pub fn window_sum(&self, event: MetricEvent, window_ms: u64, at_ms: u64) -> u64 {
        let mut total = 0u64;
        for bucket in &self.buckets {
            let start = bucket.window_start.load(Ordering::SeqCst);
            if start == BUCKET_RESET_IN_PROGRESS || start > at_ms {
                continue;
            }
            if at_ms - start < window_ms {
                total = total.saturating_add(bucket.counters[event.index()].load(Ordering::SeqCst));
            }
        }
        total
    }

    /// 整个区间内的事件总量
    pub fn interval_sum(&self, event: MetricEvent, at_ms: u64) -> u64 {
        self.window_sum(event, self.interval_ms, at_ms)
    }

    /// 区间内事件的每秒速率
    pub fn rate_per_second(&self, event: MetricEvent, at_ms: u64) -> f64 {
        let seconds = self.interval_ms as f64 / MS_PER_SECOND as f64;
        self.interval_sum(event, at_ms) as f64 / seconds
    }

    /// 区间内的平均响应时间（毫秒）
    ///
    /// 以完成数（成功加异常）为分母；无完成时返回0。
    pub fn average_rt(&self, at_ms: u64) -> f64 {
        let completions = self.interval_sum(MetricEvent::Success, at_ms)
            + self.interval_sum(MetricEvent::Exception, at_ms);
        if completions == 0 {
            return 0.0;
        }
        self.interval_sum(MetricEvent::RtSum, at_ms) as f64 / completions as f64
    }

    /// 当前统计快照
    pub fn snapshot(&self, at_ms: u64) -> StatsSnapshot {
        StatsSnapshot {
            timestamp: chrono::Utc::now(),
            pass: self.interval_sum(MetricEvent::Pass, at_ms),
            block: self.interval_sum(MetricEvent::Block, at_ms),
            exception: self.interval_sum(MetricEvent::Exception, at_ms),
            success: self.interval_sum(MetricEvent::Success, at_ms),
            pass_qps: self.rate_per_second(MetricEvent::Pass, at_ms),
            block_qps: self.rate_per_second(MetricEvent::Block, at_ms),
            average_rt_ms: self.average_rt(at_ms),
        }
    }

    /// 定位并整备覆盖 `at_ms` 的桶
    ///
    /// 过期桶按哨兵协议回收：CAS 抢占 -> 清零 -> 发布新起点。回收基于
    /// 计算出的到期起点而非逐桶推进，跨多个周期的时间跳变一步完成。
    fn position_bucket(&self, at_ms: u64) -> &Bucket {
        let idx = ((at_ms / self.bucket_len_ms) as usize) % self.sample_count;
        let expected_start = at_ms - at_ms % self.bucket_len_ms;
        let bucket = &self.buckets[idx];

        let mut spins = 0u64;
        loop {
            let stored = bucket.window_start.load(Ordering::SeqCst);

            if stored == expected_start {
                return bucket;
            }

            if stored == BUCKET_RESET_IN_PROGRESS {
                // 他人正在清零，等待其发布新起点
                spins += 1;
                if spins > MAX_SPIN_ITERATIONS {
                    std::thread::yield_now();
                    spins = 0;
                } else {
                    std::hint::spin_loop();
                }
                continue;
            }

            if stored > expected_start {
                // 时钟回拨：沿用现有桶，绝不回收，避免新数据被误清
                return bucket;
            }

            // 过期桶：竞争回收，胜者清零并发布，败者重试
            if bucket
                .window_start
                .compare_exchange(
                    stored,
                    BUCKET_RESET_IN_PROGRESS,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                for counter in &bucket.counters {
                    counter.store(0, Ordering::SeqCst);
                }
                bucket.window_start.store(expected_start, Ordering::SeqCst);
                return bucket;
            }
        }
    }
}

/// 统计快照
///
/// 面向内省与演示的只读视图。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// 采样时间
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// 区间内放行数
    pub pass: u64,
    /// 区间内拒绝数
    pub block: u64,
    /// 区间内异常数
    pub exception: u64,
    /// 区间内成功数
    pub success: u64,
    /// 放行QPS
    pub pass_qps: f64,
    /// 拒绝QPS
    pub block_qps: f64,
    /// 平均响应时间（毫秒）
    pub average_rt_ms: f64,
}
