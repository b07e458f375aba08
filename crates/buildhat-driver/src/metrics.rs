//! 驱动性能指标
//!
//! 原子计数器，任何线程都可以无锁读取。

use std::sync::atomic::{AtomicU64, Ordering};

/// Build HAT 驱动指标
///
/// ```rust
/// use buildhat_driver::HatMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = HatMetrics::new();
/// metrics.lines_received.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().lines_received, 1);
/// ```
#[derive(Debug, Default)]
pub struct HatMetrics {
    /// 读线程收到的总行数（含被丢弃的行）
    pub lines_received: AtomicU64,
    /// 无法分类或格式错误而被丢弃的行数
    pub lines_dropped: AtomicU64,
    /// 超过最大行长而被丢弃的行数
    pub lines_overlong: AtomicU64,
    /// 交付给等待者的应答数
    pub replies_delivered: AtomicU64,
    /// 没有等待者而被缓存或丢弃的应答数
    pub replies_unsolicited: AtomicU64,
    /// 发送的命令数
    pub commands_sent: AtomicU64,
    /// 发送的字节数（含固件二进制载荷）
    pub bytes_sent: AtomicU64,
    /// 等待应答超时次数
    pub reply_timeouts: AtomicU64,
    /// 传输层读错误次数（不含读超时）
    pub read_errors: AtomicU64,
}

impl HatMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lines_received: self.lines_received.load(Ordering::Relaxed),
            lines_dropped: self.lines_dropped.load(Ordering::Relaxed),
            lines_overlong: self.lines_overlong.load(Ordering::Relaxed),
            replies_delivered: self.replies_delivered.load(Ordering::Relaxed),
            replies_unsolicited: self.replies_unsolicited.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            reply_timeouts: self.reply_timeouts.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.lines_received.store(0, Ordering::Relaxed);
        self.lines_dropped.store(0, Ordering::Relaxed);
        self.lines_overlong.store(0, Ordering::Relaxed);
        self.replies_delivered.store(0, Ordering::Relaxed);
        self.replies_unsolicited.store(0, Ordering::Relaxed);
        self.commands_sent.store(0, Ordering::Relaxed);
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.reply_timeouts.store(0, Ordering::Relaxed);
        self.read_errors.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub lines_received: u64,
    pub lines_dropped: u64,
    pub lines_overlong: u64,
    pub replies_delivered: u64,
    pub replies_unsolicited: u64,
    pub commands_sent: u64,
    pub bytes_sent: u64,
    pub reply_timeouts: u64,
    pub read_errors: u64,
}

impl MetricsSnapshot {
    /// 被丢弃行的比例（百分比）；没有收到任何行时返回 0.0
    pub fn drop_rate(&self) -> f64 {
        if self.lines_received == 0 {
            return 0.0;
        }
        (self.lines_dropped as f64 / self.lines_received as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_metrics_default() {
        let snapshot = HatMetrics::new().snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
        assert_eq!(snapshot.drop_rate(), 0.0);
    }

    #[test]
    fn test_metrics_reset() {
        let metrics = HatMetrics::new();
        metrics.lines_received.fetch_add(10, Ordering::Relaxed);
        metrics.lines_dropped.fetch_add(5, Ordering::Relaxed);
        assert_eq!(metrics.snapshot().drop_rate(), 50.0);

        metrics.reset();
        assert_eq!(metrics.snapshot().lines_received, 0);
    }

    #[test]
    fn test_metrics_concurrent_updates() {
        let metrics = Arc::new(HatMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().commands_sent, 4000);
    }
}
