//! 运动规划
//!
//! 纯数值计算：把“转多少度 / 转到哪个角度”换算成固件斜坡设定值
//! 所需的起止圈数和时长。执行由 [`crate::motor`] 负责。
//!
//! # 约定
//!
//! - 位置单位：度（相对编码器读数，开机归零，不回绕）
//! - 绝对位置：-180..=179 度（180 视为 -180）
//! - 顺时针为正方向
//! - 斜坡时长 = |Δ圈数| / (|速度| × 0.05 × 功率限制)

use crate::error::HatError;
use std::time::Duration;

/// 速度 → 圈/秒 的换算系数
pub const SPEED_SCALE: f64 = 0.05;

/// 单次运动的最长时长（秒，一周）
pub const MAX_MOVE_SECONDS: f64 = 604_800.0;

/// 绝对定位的旋转方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// 走最短路径
    #[default]
    Shortest,
    /// 顺时针（正方向）
    Clockwise,
    /// 逆时针（负方向）
    Anticlockwise,
}

/// 一次斜坡运动的规划结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionPlan {
    pub start_rotations: f64,
    pub end_rotations: f64,
    pub duration_seconds: f64,
}

impl MotionPlan {
    /// 目标位置（度）
    pub fn target_degrees(&self) -> f64 {
        self.end_rotations * 360.0
    }

    /// 位移（圈，带符号）
    pub fn delta_rotations(&self) -> f64 {
        self.end_rotations - self.start_rotations
    }
}

/// 校验速度（-100..=100；`allow_zero` 为 false 时拒绝 0）
pub fn validate_speed(speed: f64, allow_zero: bool) -> Result<f64, HatError> {
    if !speed.is_finite() || !(-100.0..=100.0).contains(&speed) || (!allow_zero && speed == 0.0) {
        return Err(HatError::InvalidSpeed(speed));
    }
    Ok(speed)
}

/// 校验功率限制（0 < limit <= 1）
pub fn validate_power_limit(limit: f64) -> Result<f64, HatError> {
    if !limit.is_finite() || limit <= 0.0 || limit > 1.0 {
        return Err(HatError::InvalidPowerLimit(limit));
    }
    Ok(limit)
}

/// 校验绝对目标角度（-180..=180）
pub fn validate_angle(angle: f64) -> Result<f64, HatError> {
    if !angle.is_finite() || !(-180.0..=180.0).contains(&angle) {
        return Err(HatError::InvalidAngle(angle));
    }
    Ok(angle)
}

/// 校验时长（秒，0 < seconds <= MAX_MOVE_SECONDS）
pub fn validate_duration(seconds: f64) -> Result<f64, HatError> {
    if !seconds.is_finite() || seconds <= 0.0 || seconds > MAX_MOVE_SECONDS {
        return Err(HatError::InvalidDuration(seconds));
    }
    Ok(seconds)
}

/// 校验相对位移（度或圈，> 0）
pub fn validate_degrees(degrees: f64) -> Result<f64, HatError> {
    if !degrees.is_finite() || degrees <= 0.0 {
        return Err(HatError::InvalidDegrees(degrees));
    }
    Ok(degrees)
}

/// 把规划出的秒数换算为 `Duration`
///
/// 超过 [`MAX_MOVE_SECONDS`] 的运动在发送任何命令之前被拒绝。
pub fn move_duration(seconds: f64) -> Result<Duration, HatError> {
    if !(0.0..=MAX_MOVE_SECONDS).contains(&seconds) {
        return Err(HatError::MoveTooLong(seconds));
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| HatError::MoveTooLong(seconds))
}

fn checked_plan(
    start_rotations: f64,
    end_rotations: f64,
    duration_seconds: f64,
) -> Result<MotionPlan, HatError> {
    move_duration(duration_seconds)?;
    Ok(MotionPlan {
        start_rotations,
        end_rotations,
        duration_seconds,
    })
}

/// 斜坡时长（秒）
pub fn ramp_duration(start_rotations: f64, end_rotations: f64, speed: f64, power_limit: f64) -> f64 {
    (end_rotations - start_rotations).abs() / (speed.abs() * SPEED_SCALE * power_limit)
}

/// 从当前绝对位置到目标角度的最短有符号位移，落在 [-180, 180)
pub fn shortest_delta(current_absolute: f64, target: f64) -> f64 {
    (target - current_absolute + 180.0).rem_euclid(360.0) - 180.0
}

/// 按方向在最短位移和它的 360 度补角之间选择
///
/// 补角与最短位移符号相反；方向要求的符号只能由其中一个满足。
pub fn choose_delta(diff: f64, direction: Direction) -> f64 {
    let complement = if diff > 0.0 {
        diff - 360.0
    } else if diff < 0.0 {
        diff + 360.0
    } else {
        0.0
    };
    match direction {
        Direction::Shortest => diff,
        Direction::Clockwise => diff.max(complement),
        Direction::Anticlockwise => diff.min(complement),
    }
}

/// 规划相对运动：从 `current_degrees` 沿速度方向转 `degrees` 度
pub fn plan_relative(
    current_degrees: f64,
    degrees: f64,
    speed: f64,
    power_limit: f64,
) -> Result<MotionPlan, HatError> {
    let degrees = validate_degrees(degrees)?;
    let speed = validate_speed(speed, false)?;
    let power_limit = validate_power_limit(power_limit)?;

    let target = current_degrees + degrees * speed.signum();
    let start_rotations = current_degrees / 360.0;
    let end_rotations = target / 360.0;
    checked_plan(
        start_rotations,
        end_rotations,
        ramp_duration(start_rotations, end_rotations, speed, power_limit),
    )
}

/// 规划绝对定位：把绝对位置从 `current_absolute` 转到 `target`
///
/// `current_degrees` 是同一时刻的相对编码器读数，斜坡在相对坐标系中执行。
/// 速度只取绝对值，方向由 `direction` 决定。
pub fn plan_absolute(
    current_degrees: f64,
    current_absolute: f64,
    target: f64,
    speed: f64,
    power_limit: f64,
    direction: Direction,
) -> Result<MotionPlan, HatError> {
    let target = validate_angle(target)?;
    let speed = validate_speed(speed, false)?.abs();
    let power_limit = validate_power_limit(power_limit)?;

    let diff = choose_delta(shortest_delta(current_absolute, target), direction);
    let start_rotations = current_degrees / 360.0;
    let end_rotations = (current_degrees + diff) / 360.0;
    checked_plan(
        start_rotations,
        end_rotations,
        ramp_duration(start_rotations, end_rotations, speed, power_limit),
    )
}
