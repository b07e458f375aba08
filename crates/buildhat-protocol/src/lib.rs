//! # Build HAT Protocol
//!
//! Build HAT 串口文本协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `port`: 端口编号（A-D）
//! - `command`: 下行命令的类型化表示与规范文本渲染
//! - `setpoint`: `set` 命令的设定值子形式（常量/方波/正弦/三角/脉冲/斜坡）
//! - `response`: 上行文本行的分类与解析
//! - `firmware`: 固件校验和与 STX/ETX 二进制帧
//!
//! ## 行格式
//!
//! 下行命令以 CR 结尾；上行文本以 CR/LF 结尾。
//! 设备不会为应答附加请求 ID，关联由驱动层的 FIFO 完成。

pub mod command;
pub mod firmware;
pub mod port;
pub mod response;
pub mod setpoint;

// 重新导出常用类型
pub use command::{Combi, Command, DataFormat, ModeSelector, PidParams};
pub use firmware::{
    BOOTLOADER_BANNER, ETX, FIRMWARE_PREFIX, STX, checksum, frame_payload,
};
pub use port::Port;
pub use response::{DataSource, Line, PortEvent, SensorReading, SensorValue, VersionReply};
pub use setpoint::Setpoint;

use thiserror::Error;

/// 协议错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid port: {0} (expected 0-3 or A-D)")]
    InvalidPort(String),

    #[error("Combi mode list cannot be empty")]
    EmptyModeList,

    #[error("Raw write payload cannot be empty")]
    EmptyPayload,

    #[error("Unknown data format: {0}")]
    InvalidDataFormat(String),

    #[error("LED mode out of range: {0} (expected -1..=3)")]
    InvalidLedMode(i8),
}
