//! 板级 Builder 与 `BuildHat` 句柄
//!
//! 打开流程：
//!
//! 1. 打开传输、启动驱动读线程
//! 2. 检测固件（必要时写入固件包）
//! 3. 停止所有端口的数据输出、关闭回显
//! 4. 发送 `list`，等待每个端口报告一次连接状态

use crate::config::{FirmwareTiming, HatConfig, MotorDefaults};
use crate::error::HatError;
use crate::firmware::{FirmwareBundle, FirmwareState, FirmwareUpdater};
use crate::motor::Motor;
use buildhat_driver::{ConnectionState, Hat, LineCallback, MetricsSnapshot};
use buildhat_protocol::{Command, ModeSelector, Port, SensorReading, VersionReply};
use buildhat_serial::Transport;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 等待端口报告时的轮询间隔
const LIST_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Build HAT Builder（链式构造）
///
/// ```no_run
/// use buildhat_client::HatBuilder;
/// use std::time::Duration;
///
/// let hat = HatBuilder::new()
///     .device("/dev/serial0")
///     .firmware_dir("/usr/share/buildhat")
///     .reply_timeout(Duration::from_secs(2))
///     .build()
///     .unwrap();
/// println!("{:.1} V", hat.voltage().unwrap());
/// ```
#[derive(Debug, Clone, Default)]
pub struct HatBuilder {
    config: HatConfig,
    bundle: Option<FirmwareBundle>,
}

impl HatBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: HatConfig) -> Self {
        Self {
            config,
            bundle: None,
        }
    }

    pub fn config(&self) -> &HatConfig {
        &self.config
    }

    /// 串口设备路径（默认 `/dev/serial0`）
    pub fn device(mut self, path: impl Into<String>) -> Self {
        self.config.serial.device = path.into();
        self
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.serial.baud_rate = baud_rate;
        self
    }

    /// 默认应答超时
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.config.driver.reply_timeout_ms = saturating_millis(timeout);
        self
    }

    /// 初始化时等待端口报告的最长时间
    pub fn list_timeout(mut self, timeout: Duration) -> Self {
        self.config.driver.list_timeout_ms = saturating_millis(timeout);
        self
    }

    /// 使用内存中的固件包（优先于 `firmware_dir`）
    pub fn firmware_bundle(mut self, bundle: FirmwareBundle) -> Self {
        self.bundle = Some(bundle);
        self
    }

    /// 固件包目录
    pub fn firmware_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.firmware.dir = Some(dir.into());
        self
    }

    pub fn firmware_timing(mut self, timing: FirmwareTiming) -> Self {
        self.config.firmware.timing = timing;
        self
    }

    /// `version` 查询超时
    pub fn detect_timeout(mut self, timeout: Duration) -> Self {
        self.config.firmware.detect_timeout_ms = saturating_millis(timeout);
        self
    }

    /// 跳过固件检测
    pub fn skip_firmware_check(mut self) -> Self {
        self.config.firmware.check = false;
        self
    }

    pub fn motor_defaults(mut self, defaults: MotorDefaults) -> Self {
        self.config.motor = defaults;
        self
    }

    /// 打开串口并初始化
    #[cfg(feature = "serial")]
    pub fn build(self) -> Result<BuildHat, HatError> {
        let transport = buildhat_serial::SerialTransport::open(&self.config.serial_config())
            .map_err(buildhat_driver::DriverError::from)?;
        self.build_with(transport)
    }

    /// 使用给定的传输初始化（测试或自定义后端）
    pub fn build_with<T: Transport>(self, transport: T) -> Result<BuildHat, HatError> {
        let HatBuilder { config, bundle } = self;

        let bundle = match (bundle, &config.firmware.dir) {
            (Some(bundle), _) => Some(bundle),
            (None, Some(dir)) if config.firmware.check => Some(FirmwareBundle::from_dir(dir)?),
            _ => None,
        };

        let hat = Arc::new(Hat::new(transport, config.dispatcher_config())?);

        let firmware_state = if config.firmware.check {
            FirmwareUpdater::new(
                &hat,
                config.firmware.timing,
                config.firmware.detect_timeout(),
            )
            .ensure(bundle.as_ref())?
        } else {
            FirmwareState::Unknown
        };

        initialise_ports(&hat, config.driver.list_timeout())?;

        info!("Build HAT ready");
        Ok(BuildHat {
            hat,
            config,
            firmware_state,
        })
    }
}

/// 毫秒数；超出 `u64` 时取最大值
fn saturating_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// 停止所有端口的数据输出，关闭回显，然后等待 `list` 的端口报告
fn initialise_ports(hat: &Hat, list_timeout: Duration) -> Result<(), HatError> {
    let mut commands = Vec::with_capacity(Port::ALL.len() * 2 + 1);
    for port in Port::ALL {
        commands.push(Command::Port(port));
        commands.push(Command::Select(None));
    }
    commands.push(Command::Echo(false));
    hat.send(&Command::Compound(commands))?;

    let before = hat.port_report_counts();
    hat.send(&Command::List)?;

    let deadline = Instant::now() + list_timeout;
    loop {
        let counts = hat.port_report_counts();
        if counts.iter().zip(before.iter()).all(|(now, was)| now > was) {
            return Ok(());
        }
        if Instant::now() >= deadline {
            let missing: Vec<Port> = Port::ALL
                .into_iter()
                .filter(|port| counts[port.index()] == before[port.index()])
                .collect();
            warn!("No list report for ports {:?} within {:?}", missing, list_timeout);
            return Ok(());
        }
        spin_sleep::sleep(LIST_POLL_INTERVAL);
    }
}

/// 已初始化的 Build HAT
pub struct BuildHat {
    hat: Arc<Hat>,
    config: HatConfig,
    firmware_state: FirmwareState,
}

impl BuildHat {
    /// 底层驱动句柄
    pub fn hat(&self) -> &Arc<Hat> {
        &self.hat
    }

    pub fn config(&self) -> &HatConfig {
        &self.config
    }

    /// 打开时检测到的固件状态
    pub fn firmware_state(&self) -> &FirmwareState {
        &self.firmware_state
    }

    /// 端口上的电机（使用配置中的电机默认参数）
    pub fn motor(&self, port: Port) -> Result<Motor, HatError> {
        Motor::new(self.hat.clone(), port, self.config.motor)
    }

    /// 输入电压
    pub fn voltage(&self) -> Result<f64, HatError> {
        Ok(self.hat.query_voltage()?)
    }

    pub fn version(&self) -> Result<VersionReply, HatError> {
        Ok(self.hat.query_version(self.hat.reply_timeout())?)
    }

    pub fn port_state(&self, port: Port) -> ConnectionState {
        self.hat.port_state(port)
    }

    pub fn port_states(&self) -> [ConnectionState; 4] {
        self.hat.port_states()
    }

    /// LED 模式：-1 电压指示，0 关闭，1 橙，2 绿，3 橙+绿
    pub fn set_led_mode(&self, mode: i8) -> Result<(), HatError> {
        self.hat.send(&Command::led_mode(mode)?)?;
        Ok(())
    }

    /// 切换端口模式并读取一条数据（传感器类设备使用）
    pub fn read_mode(&self, port: Port, selector: ModeSelector) -> Result<SensorReading, HatError> {
        Ok(self
            .hat
            .read_mode(port, selector, self.hat.reply_timeout())?)
    }

    pub fn add_callback(&self, callback: Arc<dyn LineCallback>) {
        self.hat.add_callback(callback);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.hat.metrics()
    }

    /// 关闭驱动（幂等）
    pub fn close(&self) {
        self.hat.close();
    }
}

impl std::fmt::Debug for BuildHat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildHat")
            .field("firmware_state", &self.firmware_state)
            .field("ports", &self.hat.port_states())
            .finish()
    }
}
