//! 端口状态表与共享上下文
//!
//! 所有由读线程写入、由 API 读取的状态都放在 `HatContext` 中，
//! 端口表、应答注册表和传感器缓存共用一把 `RwLock`，
//! 这样“分发一行”对三者的修改是原子的。

use crate::hooks::HookManager;
use crate::registry::PendingRegistry;
use buildhat_protocol::{Port, SensorReading};
use parking_lot::RwLock;

/// 主动电机的设备类型 ID
pub const ACTIVE_MOTOR_IDS: [i32; 8] = [38, 46, 47, 48, 49, 65, 75, 76];
/// 被动电机的设备类型 ID
pub const PASSIVE_MOTOR_IDS: [i32; 2] = [1, 2];

/// 连接类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// 主动设备（有 UART 数据通道）
    Active,
    /// 被动设备（只有 ID 电阻）
    Passive,
}

/// 按设备类型 ID 区分的设备种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// 带编码器的电机（支持位置/速度闭环）
    ActiveMotor(i32),
    /// 无编码器电机（只支持 PWM/功率）
    PassiveMotor(i32),
    /// 其他设备（传感器、灯等）
    Other(i32),
}

impl DeviceKind {
    pub fn from_type_id(id: i32) -> Self {
        if ACTIVE_MOTOR_IDS.contains(&id) {
            DeviceKind::ActiveMotor(id)
        } else if PASSIVE_MOTOR_IDS.contains(&id) {
            DeviceKind::PassiveMotor(id)
        } else {
            DeviceKind::Other(id)
        }
    }

    pub fn type_id(self) -> i32 {
        match self {
            DeviceKind::ActiveMotor(id) | DeviceKind::PassiveMotor(id) | DeviceKind::Other(id) => id,
        }
    }

    pub fn is_motor(self) -> bool {
        matches!(self, DeviceKind::ActiveMotor(_) | DeviceKind::PassiveMotor(_))
    }
}

/// 单个端口的连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    /// 设备类型 ID（-1 表示无设备）
    pub device_type_id: i32,
    pub connected: bool,
    pub link: Option<LinkKind>,
}

impl ConnectionState {
    pub const DISCONNECTED: ConnectionState = ConnectionState {
        device_type_id: -1,
        connected: false,
        link: None,
    };

    pub fn connected(device_type_id: i32, link: LinkKind) -> Self {
        Self {
            device_type_id,
            connected: true,
            link: Some(link),
        }
    }

    /// 设备种类（未连接时返回 `None`）
    pub fn device_kind(&self) -> Option<DeviceKind> {
        self.connected
            .then(|| DeviceKind::from_type_id(self.device_type_id))
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::DISCONNECTED
    }
}

/// 受同一把锁保护的可变状态
#[derive(Debug, Default)]
pub struct HatState {
    pub ports: [ConnectionState; 4],
    /// 每个端口收到连接类事件（连接/断开/无设备）的次数
    pub port_reports: [u64; 4],
    /// 没有等待者时到达的最新传感器读数（读取后清空）
    pub sensor_cache: [Option<SensorReading>; 4],
    pub registry: PendingRegistry,
}

impl HatState {
    pub fn port(&self, port: Port) -> ConnectionState {
        self.ports[port.index()]
    }

    /// 记录端口的新连接状态
    pub fn set_port(&mut self, port: Port, state: ConnectionState) {
        self.ports[port.index()] = state;
        self.port_reports[port.index()] += 1;
    }
}

/// 读线程与 API 之间共享的上下文
#[derive(Default)]
pub struct HatContext {
    pub state: RwLock<HatState>,
    /// 行钩子（读线程使用 `try_read`，不会被注册操作阻塞太久）
    pub hooks: RwLock<HookManager>,
}

impl HatContext {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_kind_from_type_id() {
        assert_eq!(DeviceKind::from_type_id(75), DeviceKind::ActiveMotor(75));
        assert_eq!(DeviceKind::from_type_id(38), DeviceKind::ActiveMotor(38));
        assert_eq!(DeviceKind::from_type_id(1), DeviceKind::PassiveMotor(1));
        assert_eq!(DeviceKind::from_type_id(61), DeviceKind::Other(61));
        assert!(DeviceKind::from_type_id(2).is_motor());
        assert!(!DeviceKind::from_type_id(63).is_motor());
    }

    #[test]
    fn test_connection_state_default_is_disconnected() {
        let state = ConnectionState::default();
        assert_eq!(state.device_type_id, -1);
        assert!(!state.connected);
        assert_eq!(state.device_kind(), None);

        let state = ConnectionState::connected(48, LinkKind::Active);
        assert_eq!(state.device_kind(), Some(DeviceKind::ActiveMotor(48)));
    }

    #[test]
    fn test_context_starts_with_all_ports_disconnected() {
        let ctx = HatContext::new();
        let state = ctx.state.read();
        for port in Port::ALL {
            assert_eq!(state.port(port), ConnectionState::DISCONNECTED);
            assert!(state.sensor_cache[port.index()].is_none());
        }
    }
}
