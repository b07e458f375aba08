//! 应答注册表
//!
//! 设备不给应答附加请求 ID，所以同一类别（以及同一端口）的应答
//! 按发出顺序交付：每个请求在发出前登记一个一次性槽位，
//! 分发器收到对应类别的行时把值交给**最早**仍然存活的槽位。
//!
//! 超时的等待者会被移除，之后到达的同类行不会再交付给它，
//! 而是交给下一个等待者（没有就丢弃）。

use buildhat_protocol::{Port, SensorReading, VersionReply};
use crate::error::DriverError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

/// 应答类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKey {
    /// `version` 的应答（全局）
    Version,
    /// `vin` 的应答（全局）
    Voltage,
    /// 某端口的传感器数据
    SensorData(Port),
    /// 某端口的斜坡完成事件
    RampDone(Port),
    /// 某端口的脉冲完成事件
    PulseDone(Port),
}

impl RequestKey {
    pub fn port(&self) -> Option<Port> {
        match *self {
            RequestKey::Version | RequestKey::Voltage => None,
            RequestKey::SensorData(port) | RequestKey::RampDone(port) | RequestKey::PulseDone(port) => {
                Some(port)
            },
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKey::Version => write!(f, "version reply"),
            RequestKey::Voltage => write!(f, "voltage reply"),
            RequestKey::SensorData(port) => write!(f, "sensor data on port {port}"),
            RequestKey::RampDone(port) => write!(f, "ramp done on port {port}"),
            RequestKey::PulseDone(port) => write!(f, "pulse done on port {port}"),
        }
    }
}

/// 交付给等待者的值
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Version(VersionReply),
    Voltage(f64),
    SensorData(SensorReading),
    /// 斜坡/脉冲完成
    Done,
}

#[derive(Debug)]
struct Slot {
    id: u64,
    tx: Sender<Reply>,
}

/// 一次性等待句柄
#[derive(Debug)]
pub struct Waiter {
    key: RequestKey,
    id: u64,
    rx: Receiver<Reply>,
}

impl Waiter {
    pub fn key(&self) -> RequestKey {
        self.key
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// 最多等待 `slice`，不消耗等待者
    ///
    /// 用于需要在等待期间检查取消条件的调用方；放弃等待时应调用 `Hat::cancel`。
    pub fn poll(&self, slice: Duration) -> Result<Option<Reply>, DriverError> {
        match self.rx.recv_timeout(slice) {
            Ok(reply) => Ok(Some(reply)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(DriverError::Closed),
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<Reply> {
        &self.rx
    }
}

/// 按类别排队的等待者
#[derive(Debug, Default)]
pub struct PendingRegistry {
    next_id: u64,
    queues: HashMap<RequestKey, VecDeque<Slot>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在 `key` 的队尾登记一个等待者
    pub fn register(&mut self, key: RequestKey) -> Waiter {
        let (tx, rx) = bounded(1);
        let id = self.next_id;
        self.next_id += 1;
        self.queues.entry(key).or_default().push_back(Slot { id, tx });
        Waiter { key, id, rx }
    }

    /// 把 `reply` 交付给 `key` 最早的存活等待者
    ///
    /// 接收端已被丢弃的槽位会被跳过。没有等待者时原样返回 `Err(reply)`。
    pub fn resolve(&mut self, key: RequestKey, reply: Reply) -> Result<u64, Reply> {
        let Some(queue) = self.queues.get_mut(&key) else {
            return Err(reply);
        };
        let mut reply = reply;
        let result = loop {
            let Some(slot) = queue.pop_front() else {
                break Err(reply);
            };
            match slot.tx.try_send(reply) {
                Ok(()) => break Ok(slot.id),
                Err(e) => reply = e.into_inner(),
            }
        };
        if queue.is_empty() {
            self.queues.remove(&key);
        }
        result
    }

    /// 移除仍在排队的等待者；已被交付（或不存在）时返回 `false`
    pub fn cancel(&mut self, key: RequestKey, id: u64) -> bool {
        let Some(queue) = self.queues.get_mut(&key) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|slot| slot.id != id);
        let removed = queue.len() != before;
        if queue.is_empty() {
            self.queues.remove(&key);
        }
        removed
    }

    /// `key` 上排队的等待者数量
    pub fn pending(&self, key: RequestKey) -> usize {
        self.queues.get(&key).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// 丢弃所有等待者（它们会观察到通道断开）
    pub fn clear(&mut self) {
        self.queues.clear();
    }
}
