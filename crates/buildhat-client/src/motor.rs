//! 电机 API
//!
//! 在一个端口上执行运动规划。带编码器的电机（主动电机）支持位置/速度闭环，
//! 无编码器电机（被动电机）只支持 PWM 功率输出。
//!
//! # 数据流
//!
//! 主动电机初始化时选择 combi 0（速度、位置、绝对位置）并按
//! `sample_rate_ms` 持续输出，读取走驱动层的传感器数据通道。

use crate::cancel::CancelToken;
use crate::config::MotorDefaults;
use crate::error::HatError;
use crate::motion::{self, Direction, MotionPlan};
use buildhat_driver::{DeviceKind, DriverError, Hat, RequestKey, Waiter};
use buildhat_protocol::{Command, DataFormat, ModeSelector, PidParams, Port, SensorReading, Setpoint};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// combi 0 的模式列表：速度、相对位置、绝对位置
const MOTOR_COMBI_MODES: [(u8, u8); 3] = [(1, 0), (2, 0), (3, 0)];

/// PWM 参数（阈值、最小占空比）
const PWM_THRESHOLD: f64 = 0.65;
const PWM_MIN: f64 = 0.01;

/// 位置斜坡用的 PID（输入为 combi 0 的位置字段，单位换算为圈）
fn ramp_pid(port: Port) -> PidParams {
    PidParams {
        port,
        mode: 0,
        offset: 1,
        format: DataFormat::S4,
        scale: 0.0027777778,
        unwrap: false,
        kp: 5.0,
        ki: 0.0,
        kd: 0.1,
        windup: 3.0,
        bias: 0.01,
    }
}

/// 速度控制用的 PID（输入为 combi 0 的速度字段）
fn speed_pid(port: Port) -> PidParams {
    PidParams {
        port,
        mode: 0,
        offset: 0,
        format: DataFormat::S1,
        scale: 1.0,
        unwrap: false,
        kp: 0.003,
        ki: 0.01,
        kd: 0.0,
        windup: 100.0,
        bias: 0.01,
    }
}

/// 运动选项
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// 是否阻塞到运动完成
    pub blocking: bool,
    /// 阻塞运动的取消令牌
    pub cancel: Option<CancelToken>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::blocking()
    }
}

impl RunOptions {
    pub fn blocking() -> Self {
        Self {
            blocking: true,
            cancel: None,
        }
    }

    /// 发出命令后立即返回
    pub fn non_blocking() -> Self {
        Self {
            blocking: false,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// 电机读数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorReading {
    /// 速度（-100..=100）
    pub speed: f64,
    /// 相对位置（度，开机归零）
    pub position: f64,
    /// 绝对位置（-180..=179 度）
    pub absolute_position: f64,
}

impl MotorReading {
    fn from_reading(port: Port, reading: &SensorReading) -> Result<Self, HatError> {
        match (reading.float(0), reading.float(1), reading.float(2)) {
            (Some(speed), Some(position), Some(absolute_position)) => Ok(Self {
                speed,
                position,
                absolute_position,
            }),
            _ => Err(HatError::Driver(DriverError::UnexpectedReply {
                key: RequestKey::SensorData(port),
            })),
        }
    }
}

/// 端口上的电机
pub struct Motor {
    hat: Arc<Hat>,
    port: Port,
    kind: DeviceKind,
    defaults: MotorDefaults,
    power_limit: f64,
    release: bool,
    default_speed: f64,
}

impl Motor {
    /// 检查端口上的设备并初始化电机
    ///
    /// # 错误
    /// - `HatError::NoDevice`: 端口未连接设备
    /// - `HatError::NotAMotor`: 设备不是电机
    pub fn new(hat: Arc<Hat>, port: Port, defaults: MotorDefaults) -> Result<Self, HatError> {
        let power_limit = motion::validate_power_limit(defaults.power_limit)?;
        let default_speed = motion::validate_speed(defaults.default_speed, false)?;

        let kind = hat
            .port_state(port)
            .device_kind()
            .ok_or(HatError::NoDevice(port))?;

        match kind {
            DeviceKind::ActiveMotor(_) => {
                hat.send(&Command::on_port(
                    port,
                    [
                        Command::combi(0, MOTOR_COMBI_MODES.to_vec())?,
                        Command::Select(Some(ModeSelector::decoded(0))),
                        Command::SelRate(defaults.sample_rate_ms),
                    ],
                ))?;
                hat.send(&Command::on_port(
                    port,
                    [
                        Command::PortPlimit(power_limit),
                        Command::PwmParams {
                            threshold: PWM_THRESHOLD,
                            min_pwm: PWM_MIN,
                        },
                    ],
                ))?;
            },
            DeviceKind::PassiveMotor(_) => {
                hat.send(&Command::on_port(port, [Command::PortPlimit(power_limit)]))?;
            },
            DeviceKind::Other(_) => return Err(HatError::NotAMotor { port, kind }),
        }

        info!("Motor on port {} initialised ({:?})", port, kind);

        Ok(Self {
            hat,
            port,
            kind,
            defaults,
            power_limit,
            release: defaults.release,
            default_speed,
        })
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn power_limit(&self) -> f64 {
        self.power_limit
    }

    pub fn release(&self) -> bool {
        self.release
    }

    /// 运动结束后是否释放电机（`coast`）
    pub fn set_release(&mut self, release: bool) {
        self.release = release;
    }

    pub fn default_speed(&self) -> f64 {
        self.default_speed
    }

    pub fn set_default_speed(&mut self, speed: f64) -> Result<(), HatError> {
        self.default_speed = motion::validate_speed(speed, false)?;
        Ok(())
    }

    fn is_active(&self) -> bool {
        matches!(self.kind, DeviceKind::ActiveMotor(_))
    }

    fn require_active(&self, operation: &'static str) -> Result<(), HatError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(HatError::Unsupported {
                port: self.port,
                operation,
            })
        }
    }

    fn on_port(&self, commands: impl IntoIterator<Item = Command>) -> Result<(), HatError> {
        self.hat.send(&Command::on_port(self.port, commands))?;
        Ok(())
    }

    // ============================================================
    // 读数
    // ============================================================

    /// 读取速度、位置和绝对位置
    pub fn get(&self) -> Result<MotorReading, HatError> {
        self.require_active("reading position")?;
        let reading = self.hat.read_sensor(self.port, self.hat.reply_timeout())?;
        MotorReading::from_reading(self.port, &reading)
    }

    pub fn speed(&self) -> Result<f64, HatError> {
        Ok(self.get()?.speed)
    }

    pub fn position(&self) -> Result<f64, HatError> {
        Ok(self.get()?.position)
    }

    pub fn absolute_position(&self) -> Result<f64, HatError> {
        Ok(self.get()?.absolute_position)
    }

    // ============================================================
    // 开环控制
    // ============================================================

    /// 以恒定速度持续运转
    ///
    /// 被动电机按 `speed / 100` 的占空比输出 PWM。
    pub fn start(&self, speed: f64) -> Result<(), HatError> {
        let speed = motion::validate_speed(speed, true)?;
        if self.is_active() {
            self.on_port([
                Command::Pid(speed_pid(self.port)),
                Command::Set(Setpoint::Constant(speed)),
            ])
        } else {
            self.on_port([Command::Pwm, Command::Set(Setpoint::Constant(speed / 100.0))])
        }
    }

    /// 停止（释放电机）
    pub fn stop(&self) -> Result<(), HatError> {
        self.on_port([Command::Coast])
    }

    /// 直接输出 PWM（-1..=1）
    pub fn pwm(&self, value: f64) -> Result<(), HatError> {
        if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
            return Err(HatError::InvalidPwm(value));
        }
        self.on_port([Command::Pwm, Command::Set(Setpoint::Constant(value))])
    }

    /// 设置端口功率限制 (0, 1]
    pub fn set_power_limit(&mut self, limit: f64) -> Result<(), HatError> {
        let limit = motion::validate_power_limit(limit)?;
        self.on_port([Command::PortPlimit(limit)])?;
        self.power_limit = limit;
        Ok(())
    }

    /// 设置 PWM 偏置（0..=1）
    pub fn set_bias(&self, bias: f64) -> Result<(), HatError> {
        if !bias.is_finite() || !(0.0..=1.0).contains(&bias) {
            return Err(HatError::InvalidBias(bias));
        }
        self.on_port([Command::Bias(bias)])
    }

    /// 把当前位置设为相对位置零点
    pub fn preset(&self) -> Result<(), HatError> {
        self.require_active("preset")?;
        self.on_port([Command::Preset])
    }

    // ============================================================
    // 位置运动
    // ============================================================

    /// 沿速度方向转动 `degrees` 度
    pub fn run_for_degrees(
        &self,
        degrees: f64,
        speed: f64,
        options: &RunOptions,
    ) -> Result<(), HatError> {
        self.require_active("run_for_degrees")?;
        motion::validate_degrees(degrees)?;
        motion::validate_speed(speed, false)?;
        let current = self.get()?;
        let plan = motion::plan_relative(current.position, degrees, speed, self.power_limit)?;
        self.execute_ramp(plan, options)
    }

    /// 沿速度方向转动 `rotations` 圈
    pub fn run_for_rotations(
        &self,
        rotations: f64,
        speed: f64,
        options: &RunOptions,
    ) -> Result<(), HatError> {
        motion::validate_degrees(rotations)?;
        self.run_for_degrees(rotations * 360.0, speed, options)
    }

    /// 转到绝对角度 `degrees`（-180..=180）
    pub fn run_to_position(
        &self,
        degrees: f64,
        speed: f64,
        direction: Direction,
        options: &RunOptions,
    ) -> Result<(), HatError> {
        self.require_active("run_to_position")?;
        motion::validate_angle(degrees)?;
        motion::validate_speed(speed, false)?;
        let current = self.get()?;
        let plan = motion::plan_absolute(
            current.position,
            current.absolute_position,
            degrees,
            speed,
            self.power_limit,
            direction,
        )?;
        self.execute_ramp(plan, options)
    }

    fn execute_ramp(&self, plan: MotionPlan, options: &RunOptions) -> Result<(), HatError> {
        debug!(
            "Port {}: ramp {:.4} -> {:.4} rotations over {:.3}s",
            self.port, plan.start_rotations, plan.end_rotations, plan.duration_seconds
        );
        let ramp_time = motion::move_duration(plan.duration_seconds)?;
        self.on_port([
            Command::Pid(ramp_pid(self.port)),
            Command::Set(Setpoint::Ramp {
                start: plan.start_rotations,
                end: plan.end_rotations,
                duration: plan.duration_seconds,
            }),
        ])?;

        let release_at = Instant::now() + ramp_time + self.defaults.release_settle();

        if !options.blocking {
            if self.release {
                spawn_release(self.hat.clone(), self.port, release_at);
            }
            return Ok(());
        }

        let target = plan.target_degrees();
        let give_up = release_at + self.hat.reply_timeout();
        // 每次读取最多等一个轮询周期，取消和截止时间在一个周期内生效
        let poll = self.defaults.poll_interval().max(Duration::from_millis(1));
        let mut last_reading = Instant::now();
        loop {
            if options.is_cancelled() {
                self.stop()?;
                return Err(HatError::Cancelled(self.port));
            }
            let reading = match self.hat.read_sensor(self.port, poll) {
                Ok(reading) => MotorReading::from_reading(self.port, &reading)?,
                Err(e) if e.is_timeout() => {
                    if last_reading.elapsed() >= self.hat.reply_timeout() {
                        return Err(e.into());
                    }
                    continue;
                },
                Err(e) => return Err(e.into()),
            };
            last_reading = Instant::now();
            if (reading.position - target).abs() <= self.defaults.tolerance_deg {
                break;
            }
            if Instant::now() >= give_up {
                warn!(
                    "Port {}: motor stopped at {:.1} degrees, target was {:.1}",
                    self.port, reading.position, target
                );
                break;
            }
            spin_sleep::sleep(poll);
        }

        if self.release {
            while Instant::now() < release_at {
                if options.is_cancelled() {
                    self.stop()?;
                    return Err(HatError::Cancelled(self.port));
                }
                let remaining = release_at.saturating_duration_since(Instant::now());
                spin_sleep::sleep(remaining.min(poll));
            }
            self.stop()?;
        }
        Ok(())
    }

    // ============================================================
    // 定时运动
    // ============================================================

    /// 以 `speed` 运转 `seconds` 秒
    pub fn run_for_seconds(
        &self,
        seconds: f64,
        speed: f64,
        options: &RunOptions,
    ) -> Result<(), HatError> {
        let seconds = motion::validate_duration(seconds)?;
        let speed = motion::validate_speed(speed, false)?;
        if self.is_active() {
            self.run_pulse(seconds, speed, options)
        } else {
            self.run_passive_for(seconds, speed, options)
        }
    }

    fn run_pulse(&self, seconds: f64, speed: f64, options: &RunOptions) -> Result<(), HatError> {
        let limit = motion::move_duration(seconds)? + self.hat.reply_timeout();
        // 先登记再发送，避免完成事件先于登记到达
        let waiter = self.hat.expect(RequestKey::PulseDone(self.port));
        let command = Command::on_port(
            self.port,
            [
                Command::Pid(speed_pid(self.port)),
                Command::Set(Setpoint::Pulse {
                    during: speed,
                    after: 0.0,
                    duration: seconds,
                }),
            ],
        );
        if let Err(e) = self.hat.send(&command) {
            self.hat.cancel(&waiter);
            return Err(e.into());
        }

        if !options.blocking {
            if self.release {
                spawn_pulse_release(self.hat.clone(), self.port, waiter, limit);
            } else {
                self.hat.cancel(&waiter);
            }
            return Ok(());
        }

        let give_up = Instant::now() + limit;
        loop {
            if options.is_cancelled() {
                self.hat.cancel(&waiter);
                self.stop()?;
                return Err(HatError::Cancelled(self.port));
            }
            if waiter.poll(self.defaults.poll_interval())?.is_some() {
                break;
            }
            if Instant::now() >= give_up {
                self.hat.cancel(&waiter);
                return Err(HatError::Driver(DriverError::Timeout { key: waiter.key() }));
            }
        }

        if self.release {
            self.stop()?;
        }
        Ok(())
    }

    fn run_passive_for(&self, seconds: f64, speed: f64, options: &RunOptions) -> Result<(), HatError> {
        let run_time = motion::move_duration(seconds)?;
        self.start(speed)?;
        let stop_at = Instant::now() + run_time;

        if !options.blocking {
            spawn_release(self.hat.clone(), self.port, stop_at);
            return Ok(());
        }

        while Instant::now() < stop_at {
            if options.is_cancelled() {
                self.stop()?;
                return Err(HatError::Cancelled(self.port));
            }
            let remaining = stop_at.saturating_duration_since(Instant::now());
            spin_sleep::sleep(remaining.min(self.defaults.poll_interval()));
        }
        self.stop()
    }
}

impl std::fmt::Debug for Motor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Motor")
            .field("port", &self.port)
            .field("kind", &self.kind)
            .field("power_limit", &self.power_limit)
            .field("release", &self.release)
            .field("default_speed", &self.default_speed)
            .finish()
    }
}

fn send_coast(hat: &Hat, port: Port) {
    if !hat.is_running() {
        return;
    }
    if let Err(e) = hat.send(&Command::on_port(port, [Command::Coast])) {
        error!("Port {}: failed to release motor: {}", port, e);
    }
}

/// 在 `at` 时刻释放电机（非阻塞运动）
fn spawn_release(hat: Arc<Hat>, port: Port, at: Instant) {
    let result = thread::Builder::new()
        .name(format!("buildhat-release-{port}"))
        .spawn(move || {
            let now = Instant::now();
            if at > now {
                spin_sleep::sleep(at - now);
            }
            send_coast(&hat, port);
        });
    if let Err(e) = result {
        error!("Port {}: failed to spawn release thread: {}", port, e);
    }
}

/// 等到脉冲完成后释放电机（非阻塞定时运动）
fn spawn_pulse_release(hat: Arc<Hat>, port: Port, waiter: Waiter, limit: Duration) {
    let result = thread::Builder::new()
        .name(format!("buildhat-release-{port}"))
        .spawn(move || match hat.wait(waiter, limit) {
            Ok(_) => send_coast(&hat, port),
            Err(e) => warn!("Port {}: pulse did not complete: {}", port, e),
        });
    if let Err(e) = result {
        error!("Port {}: failed to spawn release thread: {}", port, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_presets_render() {
        assert_eq!(
            Command::Pid(ramp_pid(Port::A)).to_string(),
            "pid 0 0 1 s4 0.0027777778 0 5 0 0.1 3 0.01"
        );
        assert_eq!(
            Command::Pid(speed_pid(Port::C)).to_string(),
            "pid 2 0 0 s1 1 0 0.003 0.01 0 100 0.01"
        );
    }

    #[test]
    fn test_motor_reading_requires_three_values() {
        let reading = SensorReading::parse("12 -340 -20").unwrap();
        let parsed = MotorReading::from_reading(Port::A, &reading).unwrap();
        assert_eq!(parsed.speed, 12.0);
        assert_eq!(parsed.position, -340.0);
        assert_eq!(parsed.absolute_position, -20.0);

        let short = SensorReading::parse("12 -340").unwrap();
        assert!(MotorReading::from_reading(Port::A, &short).is_err());
    }

    #[test]
    fn test_run_options() {
        assert!(RunOptions::default().blocking);
        let token = CancelToken::new();
        let options = RunOptions::non_blocking().with_cancel(token.clone());
        assert!(!options.blocking);
        assert!(!options.is_cancelled());
        token.cancel();
        assert!(options.is_cancelled());
    }
}
