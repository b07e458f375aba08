//! 上行文本行的分类
//!
//! 设备输出是请求应答与主动事件混合的文本流。本模块只做纯解析，
//! 状态更新和应答关联由驱动层的分发器负责。
//!
//! 分类按以下顺序首个匹配生效：
//!
//! 1. `P<0-3>:` 前缀 → 端口事件（连接/断开/无设备/斜坡完成/脉冲完成）
//! 2. 以 `" V"` 结尾且首个字段是浮点数 → 电压读数
//! 3. `Firmware version: ` 前缀或 bootloader 横幅 → 版本应答
//! 4. `P<0-3>{M|C}<n>` → 传感器数据
//! 5. 其余 → 无法分类（返回 `None`）

use crate::Port;
use crate::firmware::{BOOTLOADER_BANNER, FIRMWARE_PREFIX};
use smallvec::SmallVec;

/// 单个传感器数值
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SensorValue {
    Int(i64),
    Float(f64),
}

impl SensorValue {
    fn parse(token: &str) -> Option<Self> {
        if let Ok(v) = token.parse::<i64>() {
            return Some(SensorValue::Int(v));
        }
        token.parse::<f64>().ok().map(SensorValue::Float)
    }

    /// 按浮点数读取（整数会被转换）
    pub fn as_f64(&self) -> f64 {
        match *self {
            SensorValue::Int(v) => v as f64,
            SensorValue::Float(v) => v,
        }
    }

    /// 按整数读取（浮点数返回 `None`）
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            SensorValue::Int(v) => Some(v),
            SensorValue::Float(_) => None,
        }
    }
}

/// 一次传感器读数（按位置排列的数值）
///
/// 使用 SmallVec 在栈上预留 4 个位置，电机 combi 读数（速度、位置、绝对位置）
/// 和大多数传感器模式都不需要堆分配。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SensorReading {
    values: SmallVec<[SensorValue; 4]>,
}

impl SensorReading {
    /// 解析以空白分隔的数值载荷；任何字段无法解析时返回 `None`
    pub fn parse(payload: &str) -> Option<Self> {
        let values = payload
            .split_whitespace()
            .map(SensorValue::parse)
            .collect::<Option<SmallVec<[SensorValue; 4]>>>()?;
        Some(Self { values })
    }

    pub fn from_values(values: impl IntoIterator<Item = SensorValue>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn values(&self) -> &[SensorValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<SensorValue> {
        self.values.get(index).copied()
    }

    /// 第 `index` 个值（按浮点数）
    pub fn float(&self, index: usize) -> Option<f64> {
        self.get(index).map(|v| v.as_f64())
    }

    /// 第 `index` 个值（仅整数）
    pub fn int(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(|v| v.as_i64())
    }
}

/// `version` 命令的应答
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionReply {
    /// 正常固件：`Firmware version: <version>`
    Firmware { version: String },
    /// bootloader：包含横幅的整行
    Bootloader { banner: String },
}

impl VersionReply {
    pub fn is_bootloader(&self) -> bool {
        matches!(self, VersionReply::Bootloader { .. })
    }

    /// 固件版本号（第一个字段，bootloader 返回 `None`）
    pub fn firmware_version(&self) -> Option<&str> {
        match self {
            VersionReply::Firmware { version } => version.split_whitespace().next(),
            VersionReply::Bootloader { .. } => None,
        }
    }
}

/// 端口事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortEvent {
    /// 连接了主动设备（带设备类型 ID）
    ConnectedActive(u16),
    /// 连接了被动设备（带设备类型 ID）
    ConnectedPassive(u16),
    Disconnected,
    /// 数据阶段超时，设备被固件断开
    DataPhaseTimeout,
    NoDevice,
    RampDone,
    PulseDone,
}

/// 传感器数据来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// `P<n>M<mode>`
    Mode(u8),
    /// `P<n>C<index>`
    Combi(u8),
}

/// 已分类的上行行
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Port { port: Port, event: PortEvent },
    Voltage(f64),
    Version(VersionReply),
    SensorData {
        port: Port,
        source: DataSource,
        reading: SensorReading,
    },
}

impl Line {
    /// 分类一行文本；无法分类的行返回 `None`
    pub fn parse(raw: &str) -> Option<Line> {
        let line = raw.trim();
        let bytes = line.as_bytes();

        // 1. 端口事件
        if bytes.len() >= 3
            && bytes[0] == b'P'
            && bytes[2] == b':'
            && let Some(port) = Port::from_ascii_digit(bytes[1])
        {
            return parse_port_event(&line[3..]).map(|event| Line::Port { port, event });
        }

        // 2. 电压读数
        if line.ends_with(" V")
            && let Some(token) = line.split_whitespace().next()
            && let Ok(volts) = token.parse::<f64>()
        {
            return Some(Line::Voltage(volts));
        }

        // 3. 版本应答
        if let Some(rest) = line.strip_prefix(FIRMWARE_PREFIX) {
            return Some(Line::Version(VersionReply::Firmware {
                version: rest.trim().to_string(),
            }));
        }
        if line.contains(BOOTLOADER_BANNER) {
            return Some(Line::Version(VersionReply::Bootloader {
                banner: line.to_string(),
            }));
        }

        // 4. 传感器数据
        if bytes.len() >= 4
            && bytes[0] == b'P'
            && let Some(port) = Port::from_ascii_digit(bytes[1])
            && matches!(bytes[2], b'M' | b'C')
            && bytes[3].is_ascii_digit()
        {
            let (head, payload) = line.split_once(':').unwrap_or((line, ""));
            let number = head[3..].parse::<u8>().ok()?;
            let source = if bytes[2] == b'M' {
                DataSource::Mode(number)
            } else {
                DataSource::Combi(number)
            };
            let reading = SensorReading::parse(payload)?;
            return Some(Line::SensorData {
                port,
                source,
                reading,
            });
        }

        None
    }
}

fn parse_type_id(text: &str) -> Option<u16> {
    u16::from_str_radix(text.trim(), 16).ok()
}

fn parse_port_event(rest: &str) -> Option<PortEvent> {
    let msg = rest.trim();
    if let Some(id) = msg.strip_prefix("connected to active ID") {
        return parse_type_id(id).map(PortEvent::ConnectedActive);
    }
    if let Some(id) = msg.strip_prefix("connected to passive ID") {
        return parse_type_id(id).map(PortEvent::ConnectedPassive);
    }
    if msg.starts_with("disconnected") {
        return Some(PortEvent::Disconnected);
    }
    if msg.starts_with("timeout during data phase") {
        return Some(PortEvent::DataPhaseTimeout);
    }
    if msg.starts_with("no device detected") {
        return Some(PortEvent::NoDevice);
    }
    if msg.starts_with("ramp done") {
        return Some(PortEvent::RampDone);
    }
    if msg.starts_with("pulse done") {
        return Some(PortEvent::PulseDone);
    }
    None
}
