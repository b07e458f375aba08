//! # 板级配置
//!
//! 串口、驱动、固件和电机默认值，全部字段都有默认值，
//! 配置文件中只需要写要覆盖的部分。
//!
//! ```toml
//! [serial]
//! device = "/dev/ttyAMA0"
//!
//! [motor]
//! power_limit = 0.5
//! default_speed = 30
//! ```

use crate::error::HatError;
use buildhat_driver::DispatcherConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 板级配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HatConfig {
    pub serial: SerialSettings,
    pub driver: DriverSettings,
    pub firmware: FirmwareSettings,
    pub motor: MotorDefaults,
}

impl HatConfig {
    /// 从 TOML 文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, HatError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 文本解析配置
    pub fn from_toml_str(content: &str) -> Result<Self, HatError> {
        Ok(toml::from_str(content)?)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), HatError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HatError::ConfigIo(std::io::Error::other(e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 驱动层分发器配置
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            reply_timeout_ms: self.driver.reply_timeout_ms,
            read_error_backoff_ms: self.driver.read_error_backoff_ms,
            max_line_len: self.driver.max_line_len,
            ..DispatcherConfig::default()
        }
    }

    /// 串口配置
    #[cfg(feature = "serial")]
    pub fn serial_config(&self) -> buildhat_serial::SerialConfig {
        buildhat_serial::SerialConfig {
            path: self.serial.device.clone(),
            baud_rate: self.serial.baud_rate,
            read_timeout: Duration::from_millis(self.serial.read_timeout_ms),
        }
    }
}

/// 串口设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub device: String,
    pub baud_rate: u32,
    /// 单次读超时（毫秒）
    pub read_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            device: "/dev/serial0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 100,
        }
    }
}

/// 驱动设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    pub reply_timeout_ms: u64,
    pub read_error_backoff_ms: u64,
    pub max_line_len: usize,
    /// 初始化时等待 `list` 报告所有端口的最长时间
    pub list_timeout_ms: u64,
}

impl Default for DriverSettings {
    fn default() -> Self {
        let dispatcher = DispatcherConfig::default();
        Self {
            reply_timeout_ms: dispatcher.reply_timeout_ms,
            read_error_backoff_ms: dispatcher.read_error_backoff_ms,
            max_line_len: dispatcher.max_line_len,
            list_timeout_ms: 1_000,
        }
    }
}

impl DriverSettings {
    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }
}

/// 固件设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareSettings {
    /// 固件目录（包含 `firmware.bin`、`signature.bin`、`version`）
    pub dir: Option<PathBuf>,
    /// 是否在打开时检测 bootloader / 固件版本
    pub check: bool,
    /// `version` 查询超时（毫秒）
    pub detect_timeout_ms: u64,
    pub timing: FirmwareTiming,
}

impl Default for FirmwareSettings {
    fn default() -> Self {
        Self {
            dir: None,
            check: true,
            detect_timeout_ms: 1_000,
            timing: FirmwareTiming::default(),
        }
    }
}

impl FirmwareSettings {
    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }
}

/// 固件更新各步之间的固定等待
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareTiming {
    /// 每条命令之后（毫秒）
    pub command_settle_ms: u64,
    /// 每次二进制传输之后（毫秒）
    pub transfer_settle_ms: u64,
    /// `reboot` 之后（毫秒）
    pub reboot_settle_ms: u64,
}

impl Default for FirmwareTiming {
    fn default() -> Self {
        Self {
            command_settle_ms: 100,
            transfer_settle_ms: 100,
            reboot_settle_ms: 5_000,
        }
    }
}

impl FirmwareTiming {
    /// 全部为零（测试用）
    pub const IMMEDIATE: FirmwareTiming = FirmwareTiming {
        command_settle_ms: 0,
        transfer_settle_ms: 0,
        reboot_settle_ms: 0,
    };

    pub fn command_settle(&self) -> Duration {
        Duration::from_millis(self.command_settle_ms)
    }

    pub fn transfer_settle(&self) -> Duration {
        Duration::from_millis(self.transfer_settle_ms)
    }

    pub fn reboot_settle(&self) -> Duration {
        Duration::from_millis(self.reboot_settle_ms)
    }
}

/// 电机默认参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorDefaults {
    /// 功率限制 (0, 1]
    pub power_limit: f64,
    /// 运动结束后是否释放（`coast`）
    pub release: bool,
    /// 默认速度（-100..=100）
    pub default_speed: f64,
    /// 阻塞运动判定到位的位置容差（度）
    pub tolerance_deg: f64,
    /// 阻塞运动的位置轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 运动时长之后再等待多久释放（毫秒）
    pub release_settle_ms: u64,
    /// combi 数据流采样间隔（毫秒）
    pub sample_rate_ms: u32,
}

impl Default for MotorDefaults {
    fn default() -> Self {
        Self {
            power_limit: 0.7,
            release: true,
            default_speed: 20.0,
            tolerance_deg: 2.028,
            poll_interval_ms: 5,
            release_settle_ms: 200,
            sample_rate_ms: 10,
        }
    }
}

impl MotorDefaults {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn release_settle(&self) -> Duration {
        Duration::from_millis(self.release_settle_ms)
    }
}
