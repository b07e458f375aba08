//! 内存 mock 传输
//!
//! `MockTransport::pair()` 返回一个传输和一个代表设备端的 `MockDevice`。
//! 测试通过 `MockDevice` 注入上行文本行、查看主机写入的数据，
//! 或者挂一个自动应答线程模拟固件。

use crate::{Transport, TransportError, TransportReader, TransportWriter};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10);

struct Shared {
    closed: AtomicBool,
    written: Mutex<Vec<u8>>,
}

/// 内存传输（主机端）
pub struct MockTransport {
    reader: MockReader,
    writer: MockWriter,
}

impl MockTransport {
    /// 创建一对互联的主机端传输和设备端句柄
    pub fn pair() -> (MockTransport, MockDevice) {
        let (up_tx, up_rx) = unbounded::<Vec<u8>>();
        let (down_tx, down_rx) = unbounded::<Vec<u8>>();
        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            written: Mutex::new(Vec::new()),
        });

        let transport = MockTransport {
            reader: MockReader {
                rx: up_rx,
                pending: Vec::new(),
                read_timeout: DEFAULT_READ_TIMEOUT,
                shared: shared.clone(),
            },
            writer: MockWriter {
                tx: Some(down_tx),
                shared: shared.clone(),
            },
        };
        let device = MockDevice {
            tx: up_tx,
            rx: down_rx,
            shared,
        };
        (transport, device)
    }
}

impl Transport for MockTransport {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn split(self) -> Result<(MockReader, MockWriter), TransportError> {
        Ok((self.reader, self.writer))
    }
}

/// 主机端读端
pub struct MockReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    read_timeout: Duration,
    shared: Arc<Shared>,
}

impl TransportReader for MockReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if self.pending.is_empty() {
            match self.rx.recv_timeout(self.read_timeout) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => return Err(TransportError::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Closed),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// 主机端写端
pub struct MockWriter {
    tx: Option<Sender<Vec<u8>>>,
    shared: Arc<Shared>,
}

impl TransportWriter for MockWriter {
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let tx = match &self.tx {
            Some(tx) if !self.shared.closed.load(Ordering::Acquire) => tx,
            _ => return Err(TransportError::Closed),
        };
        self.shared.written.lock().extend_from_slice(data);
        // 设备端可能已经被丢弃，只保留写入记录
        let _ = tx.send(data.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.shared.closed.store(true, Ordering::Release);
        self.tx = None;
        Ok(())
    }
}

/// 设备端句柄
#[derive(Clone)]
pub struct MockDevice {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    shared: Arc<Shared>,
}

impl MockDevice {
    /// 注入一行上行文本（自动追加 `\r\n`）
    pub fn push_line(&self, line: &str) {
        self.push_bytes(format!("{line}\r\n").as_bytes());
    }

    /// 注入原始字节
    pub fn push_bytes(&self, bytes: &[u8]) {
        let _ = self.tx.send(bytes.to_vec());
    }

    /// 主机迄今写入的全部字节
    pub fn written(&self) -> Vec<u8> {
        self.shared.written.lock().clone()
    }

    /// 主机迄今写入的全部文本（非 UTF-8 字节按替换字符处理）
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.shared.written.lock()).into_owned()
    }

    /// 主机写入的、以 CR 结尾的命令行（不含 CR）
    pub fn written_commands(&self) -> Vec<String> {
        self.written_text()
            .split('\r')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// 清空写入记录
    pub fn clear_written(&self) {
        self.shared.written.lock().clear();
    }

    /// 等待主机的下一次写入
    pub fn next_write(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// 等待写入记录中出现 `needle`
    pub fn wait_for_written(&self, needle: &str, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.written_text().contains(needle) {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// 主机是否已关闭写端
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// 启动自动应答线程
    ///
    /// 主机写入的每一行命令（按 CR 切分）交给 `respond`，返回的每一行作为上行文本注入。
    /// 主机关闭写端后线程退出。
    pub fn spawn_responder<F>(&self, mut respond: F) -> JoinHandle<()>
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        let device = self.clone();
        thread::spawn(move || {
            let mut partial = Vec::new();
            loop {
                let chunk = match device.rx.recv_timeout(Duration::from_millis(20)) {
                    Ok(chunk) => chunk,
                    Err(RecvTimeoutError::Timeout) => {
                        if device.is_closed() {
                            break;
                        }
                        continue;
                    },
                    Err(RecvTimeoutError::Disconnected) => break,
                };
                partial.extend_from_slice(&chunk);
                while let Some(pos) = partial.iter().position(|&b| b == b'\r') {
                    let line: Vec<u8> = partial.drain(..=pos).collect();
                    let text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
                    for reply in respond(&text) {
                        device.push_line(&reply);
                    }
                }
            }
        })
    }
}
