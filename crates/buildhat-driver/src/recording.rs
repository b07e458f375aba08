//! 流量录制钩子
//!
//! 基于有界通道的 `LineCallback` 实现：每一行收发的文本被打上相对时间戳后
//! `try_send` 到通道，队列满时丢弃并计数，不会阻塞读线程。
//!
//! ```rust
//! use buildhat_driver::hooks::LineCallback;
//! use buildhat_driver::recording::LineRecorder;
//! use std::sync::Arc;
//!
//! let (recorder, rx) = LineRecorder::new(1024);
//! let callback = Arc::new(recorder) as Arc<dyn LineCallback>;
//! callback.on_line_received("8.2 V");
//! assert_eq!(rx.try_recv().unwrap().text, "8.2 V");
//! ```

use crate::hooks::LineCallback;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDirection {
    Received,
    Sent,
}

/// 录制的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedLine {
    /// 相对于录制开始的时间
    pub elapsed: Duration,
    pub direction: LineDirection,
    pub text: String,
}

/// 录制钩子
pub struct LineRecorder {
    tx: Sender<RecordedLine>,
    started: Instant,
    dropped: Arc<AtomicU64>,
}

impl LineRecorder {
    /// 创建容量为 `capacity` 的录制钩子
    pub fn new(capacity: usize) -> (Self, Receiver<RecordedLine>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                started: Instant::now(),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// 丢弃计数器（可在钩子注册后继续持有）
    pub fn dropped_lines(&self) -> &Arc<AtomicU64> {
        &self.dropped
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record(&self, direction: LineDirection, text: &str) {
        let line = RecordedLine {
            elapsed: self.started.elapsed(),
            direction,
            text: text.to_string(),
        };
        if self.tx.try_send(line).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl LineCallback for LineRecorder {
    fn on_line_received(&self, line: &str) {
        self.record(LineDirection::Received, line);
    }

    fn on_command_sent(&self, command: &str) {
        self.record(LineDirection::Sent, command);
    }
}
