//! 驱动层错误类型定义

use crate::registry::RequestKey;
use buildhat_protocol::ProtocolError;
use buildhat_serial::TransportError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议错误（命令构造失败等）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 等待应答超时（等待者已被移除）
    #[error("Timed out waiting for {key}")]
    Timeout { key: RequestKey },

    /// 驱动已关闭（读线程退出）
    #[error("Driver closed")]
    Closed,

    /// 读线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),

    /// 应答类型与请求不匹配
    #[error("Unexpected reply for {key}")]
    UnexpectedReply { key: RequestKey },
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }
}
