//! Hat 驱动句柄
//!
//! 封装读线程、共享上下文和串行化的写端，对外提供
//! “发命令”“发命令并等待应答”两类原语。

use crate::dispatcher::{DispatcherConfig, reader_loop};
use crate::error::DriverError;
use crate::hooks::{HookManager, LineCallback};
use crate::metrics::{HatMetrics, MetricsSnapshot};
use crate::registry::{Reply, RequestKey, Waiter};
use crate::state::{ConnectionState, HatContext};
use buildhat_protocol::{Command, ModeSelector, Port, SensorReading, VersionReply};
use buildhat_serial::{Transport, TransportWriter};
use crossbeam_channel::{RecvTimeoutError, TryRecvError};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// 读线程 join 的最长等待时间
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        let (tx, rx) = crossbeam_channel::bounded(1);

        // 看门狗线程代为 join，超时后由它自行结束
        thread::spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// Build HAT 驱动（对外 API）
///
/// 所有方法都接受 `&self`，可以通过 `Arc<Hat>` 在多个线程间共享。
/// 写操作由互斥锁串行化，保证命令文本不会交错。
pub struct Hat {
    writer: Mutex<Box<dyn TransportWriter>>,
    ctx: Arc<HatContext>,
    metrics: Arc<HatMetrics>,
    is_running: Arc<AtomicBool>,
    reader_thread: Mutex<Option<JoinHandle<()>>>,
    config: DispatcherConfig,
}

impl Hat {
    /// 拆分传输并启动读线程
    pub fn new<T: Transport>(transport: T, config: DispatcherConfig) -> Result<Self, DriverError> {
        let (reader, writer) = transport.split()?;

        let ctx = Arc::new(HatContext::new());
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(HatMetrics::new());

        let ctx_clone = ctx.clone();
        let is_running_clone = is_running.clone();
        let metrics_clone = metrics.clone();
        let config_clone = config.clone();

        let reader_thread = thread::Builder::new()
            .name("buildhat-reader".to_string())
            .spawn(move || {
                reader_loop(reader, ctx_clone, config_clone, is_running_clone, metrics_clone);
            })
            .map_err(|e| DriverError::IoThread(e.to_string()))?;

        info!("Build HAT driver started");

        Ok(Self {
            writer: Mutex::new(Box::new(writer)),
            ctx,
            metrics,
            is_running,
            reader_thread: Mutex::new(Some(reader_thread)),
            config,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// 默认应答超时
    pub fn reply_timeout(&self) -> Duration {
        self.config.reply_timeout()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// 发送一条命令（不等待应答）
    pub fn send(&self, command: &Command) -> Result<(), DriverError> {
        let text = command.to_string();
        debug!("-> {}", text);
        self.send_raw(command.encode().as_bytes())?;
        self.metrics.commands_sent.fetch_add(1, Ordering::Relaxed);
        if let Some(hooks) = self.ctx.hooks.try_read() {
            hooks.trigger_all_sent(&text);
        }
        Ok(())
    }

    /// 写入原始字节（固件二进制帧使用）
    pub fn send_raw(&self, data: &[u8]) -> Result<(), DriverError> {
        if !self.is_running() {
            return Err(DriverError::Closed);
        }
        let mut writer = self.writer.lock();
        writer.write_all(data)?;
        writer.flush()?;
        self.metrics
            .bytes_sent
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// 登记一个等待者（调用方随后发送触发应答的命令）
    pub fn expect(&self, key: RequestKey) -> Waiter {
        self.ctx.state.write().registry.register(key)
    }

    /// 放弃一个尚未交付的等待者
    pub fn cancel(&self, waiter: &Waiter) -> bool {
        self.ctx
            .state
            .write()
            .registry
            .cancel(waiter.key(), waiter.id())
    }

    /// 阻塞等待应答
    ///
    /// 超时后在锁内移除等待者；如果在超时与移除之间应答恰好已交付，
    /// 仍然返回该应答（只返回一次）。
    pub fn wait(&self, waiter: Waiter, timeout: Duration) -> Result<Reply, DriverError> {
        match waiter.receiver().recv_timeout(timeout) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => {
                let removed = self.cancel(&waiter);
                if !removed {
                    match waiter.receiver().try_recv() {
                        Ok(reply) => return Ok(reply),
                        Err(TryRecvError::Disconnected) => return Err(DriverError::Closed),
                        Err(TryRecvError::Empty) => {},
                    }
                }
                self.metrics.reply_timeouts.fetch_add(1, Ordering::Relaxed);
                debug!("Timed out waiting for {}", waiter.key());
                Err(DriverError::Timeout { key: waiter.key() })
            },
            Err(RecvTimeoutError::Disconnected) => Err(DriverError::Closed),
        }
    }

    /// 发送命令并等待 `key` 类别的应答
    pub fn request(
        &self,
        command: &Command,
        key: RequestKey,
        timeout: Duration,
    ) -> Result<Reply, DriverError> {
        let waiter = self.expect(key);
        if let Err(e) = self.send(command) {
            self.cancel(&waiter);
            return Err(e);
        }
        self.wait(waiter, timeout)
    }

    /// 查询固件版本（`version`）
    pub fn query_version(&self, timeout: Duration) -> Result<VersionReply, DriverError> {
        match self.request(&Command::Version, RequestKey::Version, timeout)? {
            Reply::Version(reply) => Ok(reply),
            _ => Err(DriverError::UnexpectedReply {
                key: RequestKey::Version,
            }),
        }
    }

    /// 查询输入电压（`vin`）
    pub fn query_voltage(&self) -> Result<f64, DriverError> {
        match self.request(&Command::Vin, RequestKey::Voltage, self.reply_timeout())? {
            Reply::Voltage(volts) => Ok(volts),
            _ => Err(DriverError::UnexpectedReply {
                key: RequestKey::Voltage,
            }),
        }
    }

    /// 读取端口的传感器数据
    ///
    /// 缓存中有没人取走的读数时直接返回，否则等待下一条数据行。
    pub fn read_sensor(&self, port: Port, timeout: Duration) -> Result<SensorReading, DriverError> {
        let waiter = {
            let mut state = self.ctx.state.write();
            if let Some(reading) = state.sensor_cache[port.index()].take() {
                return Ok(reading);
            }
            state.registry.register(RequestKey::SensorData(port))
        };
        let key = waiter.key();
        match self.wait(waiter, timeout)? {
            Reply::SensorData(reading) => Ok(reading),
            _ => Err(DriverError::UnexpectedReply { key }),
        }
    }

    /// 切换端口模式并等待一条新的数据行
    ///
    /// 发送 `port N ; select ...`，旧的缓存读数会被丢弃。
    pub fn read_mode(
        &self,
        port: Port,
        selector: ModeSelector,
        timeout: Duration,
    ) -> Result<SensorReading, DriverError> {
        let key = RequestKey::SensorData(port);
        let waiter = {
            let mut state = self.ctx.state.write();
            state.sensor_cache[port.index()] = None;
            state.registry.register(key)
        };
        let command = Command::on_port(port, [Command::Select(Some(selector))]);
        if let Err(e) = self.send(&command) {
            self.cancel(&waiter);
            return Err(e);
        }
        match self.wait(waiter, timeout)? {
            Reply::SensorData(reading) => Ok(reading),
            _ => Err(DriverError::UnexpectedReply { key }),
        }
    }

    /// 端口连接状态
    pub fn port_state(&self, port: Port) -> ConnectionState {
        self.ctx.state.read().port(port)
    }

    /// 全部端口的连接状态
    pub fn port_states(&self) -> [ConnectionState; 4] {
        self.ctx.state.read().ports
    }

    /// 每个端口迄今收到的连接类事件数
    pub fn port_report_counts(&self) -> [u64; 4] {
        self.ctx.state.read().port_reports
    }

    /// 某类别上排队的等待者数量
    pub fn pending(&self, key: RequestKey) -> usize {
        self.ctx.state.read().registry.pending(key)
    }

    /// 钩子管理器
    pub fn hooks(&self) -> &RwLock<HookManager> {
        &self.ctx.hooks
    }

    /// 注册一个行回调
    pub fn add_callback(&self, callback: Arc<dyn LineCallback>) {
        self.ctx.hooks.write().add_callback(callback);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 停止读线程并关闭传输（幂等）
    ///
    /// 返回后读线程不会再修改任何状态。
    pub fn close(&self) {
        self.is_running.store(false, Ordering::Release);
        // 读线程可能因对端断开已自行退出，以线程句柄判断是否已关闭
        let Some(handle) = self.reader_thread.lock().take() else {
            return;
        };

        if let Err(e) = self.writer.lock().close() {
            error!("Failed to close transport: {}", e);
        }

        if let Err(_e) = handle.join_timeout(JOIN_TIMEOUT) {
            error!(
                "Reader thread panicked or failed to shut down within {:?}",
                JOIN_TIMEOUT
            );
        }

        // 读线程已退出，剩余的等待者不会再被交付
        self.ctx.state.write().registry.clear();
        info!("Build HAT driver closed");
    }
}

impl Drop for Hat {
    fn drop(&mut self) {
        self.close();
    }
}
