//! 客户端错误类型
//!
//! 区分参数校验错误（在发送任何命令之前拒绝）、超时和传输/驱动错误。

use crate::firmware::FirmwareStage;
use buildhat_driver::{DeviceKind, DriverError};
use buildhat_protocol::{Port, ProtocolError};
use thiserror::Error;

/// Build HAT 客户端错误
#[derive(Debug, Error)]
pub enum HatError {
    // ==================== Validation Errors ====================
    /// 速度超出 -100..=100（或在需要非零时为 0）
    #[error("Invalid speed: {0} (expected -100..=100, non-zero for moves)")]
    InvalidSpeed(f64),

    /// 功率限制超出 (0, 1]
    #[error("Invalid power limit: {0} (expected 0 < limit <= 1)")]
    InvalidPowerLimit(f64),

    /// 绝对角度超出 -180..=180
    #[error("Invalid angle: {0} (expected -180..=180)")]
    InvalidAngle(f64),

    /// 时长必须为正且不超过一周
    #[error("Invalid duration: {0}s (expected 0 < seconds <= 604800)")]
    InvalidDuration(f64),

    /// 角度/圈数必须为正
    #[error("Invalid degrees: {0} (must be positive)")]
    InvalidDegrees(f64),

    /// PWM 占空比超出 -1..=1
    #[error("Invalid PWM value: {0} (expected -1..=1)")]
    InvalidPwm(f64),

    /// 偏置超出 0..=1
    #[error("Invalid bias: {0} (expected 0..=1)")]
    InvalidBias(f64),

    /// 按给定速度规划出的运动时长超出上限
    #[error("Move would take {0}s (limit is 604800s)")]
    MoveTooLong(f64),

    /// 命令构造失败（空模式列表、空原始写入等）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // ==================== Device Errors ====================
    /// 端口上没有设备
    #[error("No device connected on port {0}")]
    NoDevice(Port),

    /// 端口上的设备不是电机
    #[error("Device on port {port} is not a motor ({kind:?})")]
    NotAMotor { port: Port, kind: DeviceKind },

    /// 设备不支持该操作（例如无编码器电机的位置控制）
    #[error("{operation} is not supported by the device on port {port}")]
    Unsupported { port: Port, operation: &'static str },

    /// 阻塞运动被取消
    #[error("Motion on port {0} was cancelled")]
    Cancelled(Port),

    // ==================== Driver / Firmware Errors ====================
    /// 驱动错误（超时、传输错误、已关闭）
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 固件更新某一步失败（已中止，设备需要重新检测）
    #[error("Firmware update failed during {stage}: {source}")]
    FirmwareUpdate {
        stage: FirmwareStage,
        #[source]
        source: DriverError,
    },

    /// 固件资源缺失或不可读
    #[error("Firmware resource error: {0}")]
    FirmwareResource(String),

    /// 设备停留在 bootloader，且没有可用的固件包
    #[error("Device is in bootloader mode and no firmware bundle is available")]
    BootloaderWithoutFirmware,

    /// 固件写入并重启后设备仍停留在 bootloader
    #[error("Device remained in bootloader mode after firmware update")]
    FirmwareRejected,

    // ==================== Configuration Errors ====================
    /// 配置文件读取失败
    #[error("Config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// 配置文件解析失败
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl HatError {
    /// 是否为超时（包括固件更新过程中的超时）
    pub fn is_timeout(&self) -> bool {
        match self {
            HatError::Driver(e) | HatError::FirmwareUpdate { source: e, .. } => e.is_timeout(),
            _ => false,
        }
    }

    /// 是否为参数校验错误（此时没有任何命令被发送）
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            HatError::InvalidSpeed(_)
                | HatError::InvalidPowerLimit(_)
                | HatError::InvalidAngle(_)
                | HatError::InvalidDuration(_)
                | HatError::InvalidDegrees(_)
                | HatError::InvalidPwm(_)
                | HatError::InvalidBias(_)
                | HatError::MoveTooLong(_)
                | HatError::Protocol(_)
        )
    }
}
