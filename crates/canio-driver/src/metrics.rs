//! 驱动性能指标
//!
//! 原子计数器，IO 线程更新，任意线程读取快照，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 驱动实时指标
///
/// # 使用示例
///
/// ```rust
/// use canio_driver::DriverMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = DriverMetrics::new();
/// metrics.rx_frames.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().rx_frames, 1);
/// ```
#[derive(Debug, Default)]
pub struct DriverMetrics {
    /// 接收的总帧数（包括错误帧）
    pub rx_frames: AtomicU64,

    /// 接收的错误帧数
    pub rx_error_frames: AtomicU64,

    /// 读操作失败次数（包括 shutdown 导致的中止）
    pub read_errors: AtomicU64,

    /// 成功入队的发送帧数
    pub tx_frames: AtomicU64,

    /// 因驱动未就绪被拒绝的发送次数
    pub tx_rejected: AtomicU64,

    /// 传输层写入失败次数
    pub tx_failed: AtomicU64,
}

impl DriverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有计数器的快照（各计数器分别原子读取）
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rx_frames: self.rx_frames.load(Ordering::Relaxed),
            rx_error_frames: self.rx_error_frames.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            tx_rejected: self.tx_rejected.load(Ordering::Relaxed),
            tx_failed: self.tx_failed.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.rx_frames.store(0, Ordering::Relaxed);
        self.rx_error_frames.store(0, Ordering::Relaxed);
        self.read_errors.store(0, Ordering::Relaxed);
        self.tx_frames.store(0, Ordering::Relaxed);
        self.tx_rejected.store(0, Ordering::Relaxed);
        self.tx_failed.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub rx_frames: u64,
    pub rx_error_frames: u64,
    pub read_errors: u64,
    pub tx_frames: u64,
    pub tx_rejected: u64,
    pub tx_failed: u64,
}

impl MetricsSnapshot {
    /// 发送成功率（百分比）
    ///
    /// 没有任何发送尝试时返回 100.0。
    pub fn tx_success_rate(&self) -> f64 {
        let attempts = self.tx_frames + self.tx_rejected + self.tx_failed;
        if attempts == 0 {
            return 100.0;
        }
        (self.tx_frames as f64 / attempts as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = DriverMetrics::new();
        metrics.rx_frames.fetch_add(3, Ordering::Relaxed);
        metrics.tx_failed.fetch_add(1, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rx_frames, 3);
        assert_eq!(snapshot.tx_failed, 1);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_tx_success_rate() {
        assert_eq!(MetricsSnapshot::default().tx_success_rate(), 100.0);

        let snapshot = MetricsSnapshot {
            tx_frames: 3,
            tx_rejected: 1,
            ..Default::default()
        };
        assert_eq!(snapshot.tx_success_rate(), 75.0);
    }
}
