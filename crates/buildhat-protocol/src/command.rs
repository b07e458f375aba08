//! 下行命令模型
//!
//! 每个命令都有唯一的规范文本形式（`Display`），渲染是纯函数。
//! `Command::encode()` 在渲染结果末尾追加恰好一个 CR，用于写入串口。
//!
//! # 数值格式
//!
//! 数值格式属于协议契约的一部分：
//! - `plimit` / `port_plimit` / `pwmparams`: 固定 2 位小数
//! - 设定值（`set …`）: 固定 6 位小数（见 [`Setpoint`]）
//! - PID 参数: 最短往返表示（`5`、`0.1`、`0.0027777778`）
//!
//! # 示例
//!
//! ```rust
//! use buildhat_protocol::{Command, ModeSelector, Port};
//!
//! let cmd = Command::Compound(vec![
//!     Command::Port(Port::A),
//!     Command::Select(Some(ModeSelector::decoded(0))),
//! ]);
//! assert_eq!(cmd.encode(), "port 0 ; select 0\r");
//! ```

use crate::{Port, ProtocolError, Setpoint};
use std::fmt;
use std::str::FromStr;

/// 原始数据字段格式（`select` 原始模式与 PID 输入使用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataFormat {
    U1,
    U2,
    U4,
    S1,
    S2,
    S4,
    F4,
}

impl DataFormat {
    fn as_str(self) -> &'static str {
        match self {
            DataFormat::U1 => "u1",
            DataFormat::U2 => "u2",
            DataFormat::U4 => "u4",
            DataFormat::S1 => "s1",
            DataFormat::S2 => "s2",
            DataFormat::S4 => "s4",
            DataFormat::F4 => "f4",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "u1" => Ok(DataFormat::U1),
            "u2" => Ok(DataFormat::U2),
            "u4" => Ok(DataFormat::U4),
            "s1" => Ok(DataFormat::S1),
            "s2" => Ok(DataFormat::S2),
            "s4" => Ok(DataFormat::S4),
            "f4" => Ok(DataFormat::F4),
            other => Err(ProtocolError::InvalidDataFormat(other.to_string())),
        }
    }
}

/// 模式选择参数
///
/// - 解码输出：`select M`
/// - 原始字段输出：`select M OFFSET FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSelector {
    pub mode: u8,
    pub raw: Option<(u8, DataFormat)>,
}

impl ModeSelector {
    /// 解码输出（设备按模式定义输出数值）
    pub fn decoded(mode: u8) -> Self {
        Self { mode, raw: None }
    }

    /// 原始字段输出（从模式数据的 `offset` 处按 `format` 取值）
    pub fn raw(mode: u8, offset: u8, format: DataFormat) -> Self {
        Self {
            mode,
            raw: Some((offset, format)),
        }
    }
}

impl fmt::Display for ModeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw {
            None => write!(f, "{}", self.mode),
            Some((offset, format)) => write!(f, "{} {} {}", self.mode, offset, format),
        }
    }
}

/// Combi 模式定义（设备端把多个模式聚合为一次同步读数）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combi {
    index: u8,
    modes: Vec<(u8, u8)>,
}

impl Combi {
    /// 创建 combi 定义
    ///
    /// # 错误
    /// - `ProtocolError::EmptyModeList`: `modes` 为空
    pub fn new(index: u8, modes: Vec<(u8, u8)>) -> Result<Self, ProtocolError> {
        if modes.is_empty() {
            return Err(ProtocolError::EmptyModeList);
        }
        Ok(Self { index, modes })
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    /// `(mode, offset)` 列表
    pub fn modes(&self) -> &[(u8, u8)] {
        &self.modes
    }
}

impl fmt::Display for Combi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "combi {}", self.index)?;
        for (mode, offset) in &self.modes {
            write!(f, " {mode} {offset}")?;
        }
        Ok(())
    }
}

/// PID 控制器参数（11 个位置参数）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidParams {
    pub port: Port,
    /// 反馈输入所用的模式
    pub mode: u8,
    /// 模式数据中的字节偏移
    pub offset: u8,
    pub format: DataFormat,
    /// 输入缩放系数
    pub scale: f64,
    /// 是否对输入做回绕展开
    pub unwrap: bool,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub windup: f64,
    pub bias: f64,
}

impl fmt::Display for PidParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {} {} {} {}",
            self.port.index(),
            self.mode,
            self.offset,
            self.format,
            self.scale,
            u8::from(self.unwrap),
            self.kp,
            self.ki,
            self.kd,
            self.windup,
            self.bias
        )
    }
}

/// 下行命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // === 无参数命令 ===
    Help,
    Version,
    List,
    /// 查询输入电压
    Vin,
    Coast,
    Pwm,
    On,
    Off,
    Clear,
    Reboot,
    Preset,

    // === 单参数命令 ===
    /// 选择后续命令作用的端口
    Port(Port),
    Echo(bool),
    /// LED 模式：-1 电压指示，0 关闭，1 橙，2 绿，3 橙+绿
    LedMode(i8),
    Plimit(f64),
    PortPlimit(f64),
    Bias(f64),
    Debug(u8),
    /// 数据流采样间隔（毫秒）
    SelRate(u32),

    // === 多参数命令 ===
    PwmParams { threshold: f64, min_pwm: f64 },
    Set(Setpoint),
    Pid(PidParams),
    PidDiff(PidParams),
    /// 持续输出所选模式的数据；`None` 表示停止输出
    Select(Option<ModeSelector>),
    /// 仅输出一次所选模式的数据
    SelOnce(Option<ModeSelector>),
    Combi(Combi),
    Write1(Vec<u8>),
    Write2(Vec<u8>),

    // === 固件命令（仅 bootloader 接受） ===
    Load { len: usize, checksum: u32 },
    Signature { len: usize },

    /// 复合命令：以 `" ; "` 连接，整体只有一个结尾 CR
    Compound(Vec<Command>),
}

impl Command {
    /// 构造 LED 模式命令（校验范围）
    pub fn led_mode(mode: i8) -> Result<Self, ProtocolError> {
        if !(-1..=3).contains(&mode) {
            return Err(ProtocolError::InvalidLedMode(mode));
        }
        Ok(Command::LedMode(mode))
    }

    /// 构造 combi 命令（校验模式列表非空）
    pub fn combi(index: u8, modes: Vec<(u8, u8)>) -> Result<Self, ProtocolError> {
        Combi::new(index, modes).map(Command::Combi)
    }

    /// 构造 `write1` 原始写命令
    pub fn write1(bytes: impl Into<Vec<u8>>) -> Result<Self, ProtocolError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ProtocolError::EmptyPayload);
        }
        Ok(Command::Write1(bytes))
    }

    /// 构造 `write2` 原始写命令
    pub fn write2(bytes: impl Into<Vec<u8>>) -> Result<Self, ProtocolError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ProtocolError::EmptyPayload);
        }
        Ok(Command::Write2(bytes))
    }

    /// `port N ; <cmd>` 的便捷构造
    pub fn on_port(port: Port, commands: impl IntoIterator<Item = Command>) -> Self {
        let mut all = vec![Command::Port(port)];
        all.extend(commands);
        Command::Compound(all)
    }

    /// 渲染为线上格式（末尾恰好一个 CR）
    pub fn encode(&self) -> String {
        format!("{self}\r")
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, keyword: &str, bytes: &[u8]) -> fmt::Result {
    f.write_str(keyword)?;
    for b in bytes {
        write!(f, " {b:02x}")?;
    }
    Ok(())
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Help => f.write_str("help"),
            Command::Version => f.write_str("version"),
            Command::List => f.write_str("list"),
            Command::Vin => f.write_str("vin"),
            Command::Coast => f.write_str("coast"),
            Command::Pwm => f.write_str("pwm"),
            Command::On => f.write_str("on"),
            Command::Off => f.write_str("off"),
            Command::Clear => f.write_str("clear"),
            Command::Reboot => f.write_str("reboot"),
            Command::Preset => f.write_str("preset"),
            Command::Port(port) => write!(f, "port {}", port.index()),
            Command::Echo(on) => write!(f, "echo {}", u8::from(*on)),
            Command::LedMode(mode) => write!(f, "ledmode {mode}"),
            Command::Plimit(limit) => write!(f, "plimit {limit:.2}"),
            Command::PortPlimit(limit) => write!(f, "port_plimit {limit:.2}"),
            Command::Bias(bias) => write!(f, "bias {bias}"),
            Command::Debug(level) => write!(f, "debug {level}"),
            Command::SelRate(ms) => write!(f, "selrate {ms}"),
            Command::PwmParams { threshold, min_pwm } => {
                write!(f, "pwmparams {threshold:.2} {min_pwm:.2}")
            },
            Command::Set(setpoint) => write!(f, "set {setpoint}"),
            Command::Pid(params) => write!(f, "pid {params}"),
            Command::PidDiff(params) => write!(f, "pid_diff {params}"),
            Command::Select(None) => f.write_str("select"),
            Command::Select(Some(sel)) => write!(f, "select {sel}"),
            Command::SelOnce(None) => f.write_str("selonce"),
            Command::SelOnce(Some(sel)) => write!(f, "selonce {sel}"),
            Command::Combi(combi) => write!(f, "{combi}"),
            Command::Write1(bytes) => write_hex(f, "write1", bytes),
            Command::Write2(bytes) => write_hex(f, "write2", bytes),
            Command::Load { len, checksum } => write!(f, "load {len} {checksum}"),
            Command::Signature { len } => write!(f, "signature {len}"),
            Command::Compound(commands) => {
                for (i, cmd) in commands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ; ")?;
                    }
                    write!(f, "{cmd}")?;
                }
                Ok(())
            },
        }
    }
}
