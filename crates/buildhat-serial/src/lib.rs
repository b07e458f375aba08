//! # Build HAT Transport Layer
//!
//! 双工字节通道抽象。驱动层只依赖本 crate 的 trait，
//! 具体后端为串口（`serial` feature）或内存 mock（`mock` feature）。
//!
//! 传输层被拆分为独立的读端和写端：读端由驱动的 IO 线程独占，
//! 写端在 API 调用之间通过互斥锁共享。

use thiserror::Error;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(feature = "serial")]
pub use serial::{SerialConfig, SerialReader, SerialTransport, SerialWriter};

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockDevice, MockReader, MockTransport, MockWriter};

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(String),
    /// 读超时（没有数据到达，调用方应重试）
    #[error("Read timeout")]
    Timeout,
    /// 传输已关闭（写端调用了 `close` 或对端断开）
    #[error("Transport closed")]
    Closed,
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::Io(kind) => std::io::Error::new(kind, err.description).into(),
            _ => TransportError::Device(err.description),
        }
    }
}

impl TransportError {
    /// 是否为致命错误（读循环应退出）
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

/// 读端
pub trait TransportReader: Send {
    /// 读取可用字节
    ///
    /// 没有数据时在读超时后返回 `Err(TransportError::Timeout)`，
    /// 这样读线程可以周期性检查运行标志。
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// 写端
pub trait TransportWriter: Send {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// 关闭写端；之后读端应尽快返回 `Closed`
    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// 可拆分为读端/写端的传输
pub trait Transport {
    type Reader: TransportReader + 'static;
    type Writer: TransportWriter + 'static;

    fn split(self) -> Result<(Self::Reader, Self::Writer), TransportError>;
}

/// 已经拆分好的读写端也可以直接作为传输使用
impl<R, W> Transport for (R, W)
where
    R: TransportReader + 'static,
    W: TransportWriter + 'static,
{
    type Reader = R;
    type Writer = W;

    fn split(self) -> Result<(R, W), TransportError> {
        Ok(self)
    }
}

impl<T: TransportReader + ?Sized> TransportReader for Box<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read(buf)
    }
}

impl<T: TransportWriter + ?Sized> TransportWriter for Box<T> {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write_all(data)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }
}
