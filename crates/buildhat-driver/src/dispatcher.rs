//! 行分发器
//!
//! 读线程独占传输层的读端：把字节流切成行，分类后更新端口状态表、
//! 交付等待者或写入传感器缓存。

use crate::metrics::HatMetrics;
use crate::registry::{Reply, RequestKey};
use crate::state::{ConnectionState, HatContext, LinkKind};
use buildhat_protocol::{Line, PortEvent};
use buildhat_serial::{TransportError, TransportReader};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 分发器配置
///
/// ```
/// use buildhat_driver::DispatcherConfig;
///
/// let config = DispatcherConfig {
///     read_error_backoff_ms: 50,
///     ..DispatcherConfig::default()
/// };
/// assert_eq!(config.reply_timeout_ms, 5_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// 默认应答超时（毫秒）
    pub reply_timeout_ms: u64,
    /// 读错误后的退避时间（毫秒）
    pub read_error_backoff_ms: u64,
    /// 最大行长（字节），超过的行整体丢弃
    pub max_line_len: usize,
    /// 单次读缓冲区大小
    pub read_buffer_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 5_000,
            read_error_backoff_ms: 100,
            max_line_len: 1024,
            read_buffer_size: 256,
        }
    }
}

impl DispatcherConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

/// 字节流到行的组装器
///
/// CR 和 LF 都视为行结束符，空行跳过。超过 `max_len` 的行在遇到下一个
/// 行结束符之前的全部内容都被丢弃。
#[derive(Debug)]
pub struct LineAssembler {
    buf: Vec<u8>,
    max_len: usize,
    discarding: bool,
}

impl LineAssembler {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len.min(256)),
            max_len,
            discarding: false,
        }
    }

    /// 追加字节，每组装出一行调用一次 `on_line`；返回本次丢弃的超长行数
    pub fn feed(&mut self, data: &[u8], mut on_line: impl FnMut(&str)) -> usize {
        let mut overlong = 0;
        for &byte in data {
            if byte == b'\r' || byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                    overlong += 1;
                } else if !self.buf.is_empty() {
                    let line = String::from_utf8_lossy(&self.buf);
                    on_line(&line);
                }
                self.buf.clear();
                continue;
            }
            if self.discarding {
                continue;
            }
            if self.buf.len() >= self.max_len {
                self.buf.clear();
                self.discarding = true;
                continue;
            }
            self.buf.push(byte);
        }
        overlong
    }

    /// 当前未完成的部分行长度
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

/// 读线程主循环
///
/// # 参数
/// - `reader`: 传输层读端（由本线程独占）
/// - `ctx`: 共享上下文
/// - `config`: 分发器配置
/// - `is_running`: 运行标志，`false` 时在下一次读超时后退出
/// - `metrics`: 指标
pub fn reader_loop(
    mut reader: impl TransportReader,
    ctx: Arc<HatContext>,
    config: DispatcherConfig,
    is_running: Arc<AtomicBool>,
    metrics: Arc<HatMetrics>,
) {
    let mut assembler = LineAssembler::new(config.max_line_len);
    let mut buf = vec![0u8; config.read_buffer_size.max(1)];
    let backoff = Duration::from_millis(config.read_error_backoff_ms);

    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Reader thread: is_running flag is false, exiting");
            break;
        }

        let n = match reader.read(&mut buf) {
            Ok(n) => n,
            Err(TransportError::Timeout) => continue,
            Err(e) if e.is_closed() => {
                info!("Reader thread: transport closed");
                break;
            },
            Err(e) => {
                error!("Reader thread: transport read error: {}", e);
                metrics.read_errors.fetch_add(1, Ordering::Relaxed);
                spin_sleep::sleep(backoff);
                continue;
            },
        };

        let overlong = assembler.feed(&buf[..n], |line| dispatch_line(line, &ctx, &metrics));
        if overlong > 0 {
            warn!("Discarded {} over-long line(s)", overlong);
            metrics.lines_overlong.fetch_add(overlong as u64, Ordering::Relaxed);
            metrics.lines_dropped.fetch_add(overlong as u64, Ordering::Relaxed);
        }
    }

    // 读线程退出后没有人能交付应答：后续请求直接返回 Closed，
    // 已登记的等待者立刻观察到关闭
    is_running.store(false, Ordering::Release);
    ctx.state.write().registry.clear();
    trace!("Reader thread: loop exited");
}

/// 分类并处理一行
pub fn dispatch_line(line: &str, ctx: &HatContext, metrics: &HatMetrics) {
    metrics.lines_received.fetch_add(1, Ordering::Relaxed);
    trace!("<- {}", line);

    if let Some(hooks) = ctx.hooks.try_read() {
        hooks.trigger_all(line);
    }

    let Some(parsed) = Line::parse(line) else {
        debug!("Dropping unclassified line: {:?}", line);
        metrics.lines_dropped.fetch_add(1, Ordering::Relaxed);
        return;
    };

    let mut state = ctx.state.write();
    let outcome = match parsed {
        Line::Port { port, event } => match event {
            PortEvent::ConnectedActive(id) => {
                info!("Port {}: active device 0x{:X} connected", port, id);
                state.set_port(port, ConnectionState::connected(i32::from(id), LinkKind::Active));
                Outcome::StateChanged
            },
            PortEvent::ConnectedPassive(id) => {
                info!("Port {}: passive device 0x{:X} connected", port, id);
                state.set_port(port, ConnectionState::connected(i32::from(id), LinkKind::Passive));
                Outcome::StateChanged
            },
            PortEvent::Disconnected | PortEvent::NoDevice => {
                debug!("Port {}: no device", port);
                state.set_port(port, ConnectionState::DISCONNECTED);
                Outcome::StateChanged
            },
            PortEvent::DataPhaseTimeout => {
                warn!("Port {}: timeout during data phase, device disconnected", port);
                state.set_port(port, ConnectionState::DISCONNECTED);
                Outcome::StateChanged
            },
            PortEvent::RampDone => state
                .registry
                .resolve(RequestKey::RampDone(port), Reply::Done)
                .into(),
            PortEvent::PulseDone => state
                .registry
                .resolve(RequestKey::PulseDone(port), Reply::Done)
                .into(),
        },
        Line::Voltage(volts) => state
            .registry
            .resolve(RequestKey::Voltage, Reply::Voltage(volts))
            .into(),
        Line::Version(reply) => state
            .registry
            .resolve(RequestKey::Version, Reply::Version(reply))
            .into(),
        Line::SensorData { port, reading, .. } => {
            match state
                .registry
                .resolve(RequestKey::SensorData(port), Reply::SensorData(reading))
            {
                Ok(id) => Outcome::Delivered(id),
                Err(Reply::SensorData(reading)) => {
                    state.sensor_cache[port.index()] = Some(reading);
                    Outcome::Unsolicited
                },
                Err(_) => Outcome::Unsolicited,
            }
        },
    };
    drop(state);

    match outcome {
        Outcome::Delivered(id) => {
            trace!("Delivered reply to waiter #{}", id);
            metrics.replies_delivered.fetch_add(1, Ordering::Relaxed);
        },
        Outcome::Unsolicited => {
            metrics.replies_unsolicited.fetch_add(1, Ordering::Relaxed);
        },
        Outcome::StateChanged => {},
    }
}

/// 一行处理的结果（只用于计数）
enum Outcome {
    StateChanged,
    Delivered(u64),
    Unsolicited,
}

impl From<Result<u64, Reply>> for Outcome {
    fn from(result: Result<u64, Reply>) -> Self {
        match result {
            Ok(id) => Outcome::Delivered(id),
            Err(_) => Outcome::Unsolicited,
        }
    }
}
