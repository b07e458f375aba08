//! 串口后端
//!
//! Build HAT 通过 Raspberry Pi 的 UART 连接，固定 115200 8N1、无流控。
//! 读端和写端通过 `try_clone` 共享同一个文件描述符。

use crate::{Transport, TransportError, TransportReader, TransportWriter};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// 默认设备路径（Raspberry Pi 主 UART）
pub const DEFAULT_DEVICE: &str = "/dev/serial0";
/// 默认波特率
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// 串口参数
#[derive(Debug, Clone, PartialEq)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    /// 单次读操作的超时（决定读线程检查停止标志的周期）
    pub read_timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DEVICE.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(100),
        }
    }
}

/// 已打开的串口
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// 以 8N1、无流控打开串口
    pub fn open(config: &SerialConfig) -> Result<Self, TransportError> {
        debug!(
            "Opening serial port {} at {} baud",
            config.path, config.baud_rate
        );
        let port = serialport::new(&config.path, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.read_timeout)
            .open()?;
        Ok(Self { port })
    }
}

impl Transport for SerialTransport {
    type Reader = SerialReader;
    type Writer = SerialWriter;

    fn split(self) -> Result<(SerialReader, SerialWriter), TransportError> {
        let reader_port = self.port.try_clone()?;
        let closed = Arc::new(AtomicBool::new(false));
        Ok((
            SerialReader {
                port: reader_port,
                closed: closed.clone(),
            },
            SerialWriter {
                port: self.port,
                closed,
            },
        ))
    }
}

/// 串口读端
pub struct SerialReader {
    port: Box<dyn SerialPort>,
    closed: Arc<AtomicBool>,
}

impl TransportReader for SerialReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        match self.port.read(buf) {
            Ok(n) => {
                trace!("serial read {} bytes", n);
                Ok(n)
            },
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Err(TransportError::Timeout)
            },
            Err(e) => Err(e.into()),
        }
    }
}

/// 串口写端
pub struct SerialWriter {
    port: Box<dyn SerialPort>,
    closed: Arc<AtomicBool>,
}

impl TransportWriter for SerialWriter {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.port.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        self.port.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Closing serial transport");
            // 尽量把已写入的数据发出去，失败也不影响关闭
            let _ = self.port.flush();
        }
        Ok(())
    }
}
