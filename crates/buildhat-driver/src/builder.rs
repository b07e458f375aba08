//! Builder 模式实现
//!
//! 提供链式构造 `Hat` 实例的便捷方式。

use crate::dispatcher::DispatcherConfig;
use crate::error::DriverError;
use crate::hat::Hat;
use buildhat_serial::Transport;
#[cfg(feature = "serial")]
use buildhat_serial::{SerialConfig, SerialTransport};
use std::time::Duration;

/// Hat 驱动 Builder（链式构造）
///
/// ```no_run
/// use buildhat_driver::{DispatcherConfig, DriverBuilder};
///
/// let hat = DriverBuilder::new()
///     .device("/dev/ttyAMA0")
///     .dispatcher_config(DispatcherConfig {
///         reply_timeout_ms: 2_000,
///         ..DispatcherConfig::default()
///     })
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct DriverBuilder {
    #[cfg(feature = "serial")]
    serial: SerialConfig,
    dispatcher: DispatcherConfig,
}

impl DriverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 串口设备路径（默认 `/dev/serial0`）
    #[cfg(feature = "serial")]
    pub fn device(mut self, path: impl Into<String>) -> Self {
        self.serial.path = path.into();
        self
    }

    /// 波特率（默认 115200）
    #[cfg(feature = "serial")]
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.serial.baud_rate = baud_rate;
        self
    }

    /// 单次读超时（决定读线程响应停止请求的速度）
    #[cfg(feature = "serial")]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.serial.read_timeout = timeout;
        self
    }

    #[cfg(feature = "serial")]
    pub fn serial_config(mut self, config: SerialConfig) -> Self {
        self.serial = config;
        self
    }

    pub fn dispatcher_config(mut self, config: DispatcherConfig) -> Self {
        self.dispatcher = config;
        self
    }

    /// 默认应答超时
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher.reply_timeout_ms = saturating_millis(timeout);
        self
    }

    /// 打开串口并启动驱动
    #[cfg(feature = "serial")]
    pub fn build(self) -> Result<Hat, DriverError> {
        let transport = SerialTransport::open(&self.serial)?;
        Hat::new(transport, self.dispatcher)
    }

    /// 使用给定的传输启动驱动（测试或自定义后端）
    pub fn build_with<T: Transport>(self, transport: T) -> Result<Hat, DriverError> {
        Hat::new(transport, self.dispatcher)
    }
}

/// 毫秒数；超出 `u64` 时取最大值
fn saturating_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}
