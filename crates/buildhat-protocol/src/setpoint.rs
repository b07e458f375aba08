//! `set` 命令的设定值子形式
//!
//! 固件的设定值发生器支持常量和若干波形。所有数值使用固定 6 位小数，
//! 唯一例外是脉冲的 "after" 值为 0 时渲染为 `0.0`（固件对该字段做字面匹配）。

use std::fmt;

/// 设定值
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Setpoint {
    /// 常量设定值
    Constant(f64),
    /// 方波：`square MIN MAX PERIOD PHASE`
    Square {
        min: f64,
        max: f64,
        period: f64,
        phase: f64,
    },
    /// 正弦波：`sine MIN MAX PERIOD PHASE`
    Sine {
        min: f64,
        max: f64,
        period: f64,
        phase: f64,
    },
    /// 三角波：`triangle MIN MAX PERIOD PHASE`
    Triangle {
        min: f64,
        max: f64,
        period: f64,
        phase: f64,
    },
    /// 脉冲：保持 `during` 持续 `duration` 秒，然后切换到 `after`
    Pulse {
        during: f64,
        after: f64,
        duration: f64,
    },
    /// 斜坡：在 `duration` 秒内从 `start` 线性插值到 `end`
    Ramp { start: f64, end: f64, duration: f64 },
}

/// 渲染脉冲的 "after" 字段
fn pulse_after(after: f64) -> String {
    if after == 0.0 {
        "0.0".to_string()
    } else {
        format!("{after:.6}")
    }
}

impl fmt::Display for Setpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Setpoint::Constant(value) => write!(f, "{value:.6}"),
            Setpoint::Square {
                min,
                max,
                period,
                phase,
            } => write!(f, "square {min:.6} {max:.6} {period:.6} {phase:.6}"),
            Setpoint::Sine {
                min,
                max,
                period,
                phase,
            } => write!(f, "sine {min:.6} {max:.6} {period:.6} {phase:.6}"),
            Setpoint::Triangle {
                min,
                max,
                period,
                phase,
            } => write!(f, "triangle {min:.6} {max:.6} {period:.6} {phase:.6}"),
            Setpoint::Pulse {
                during,
                after,
                duration,
            } => write!(
                f,
                "pulse {during:.6} {} {duration:.6} 0",
                pulse_after(after)
            ),
            Setpoint::Ramp {
                start,
                end,
                duration,
            } => write!(f, "ramp {start:.6} {end:.6} {duration:.6} 0"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_after_zero_renders_short_form() {
        let sp = Setpoint::Pulse {
            during: 50.0,
            after: 0.0,
            duration: 2.5,
        };
        assert_eq!(sp.to_string(), "pulse 50.000000 0.0 2.500000 0");
    }

    #[test]
    fn test_pulse_after_nonzero_uses_six_decimals() {
        let sp = Setpoint::Pulse {
            during: -20.0,
            after: 10.0,
            duration: 1.0,
        };
        assert_eq!(sp.to_string(), "pulse -20.000000 10.000000 1.000000 0");
    }

    #[test]
    fn test_ramp_render() {
        let sp = Setpoint::Ramp {
            start: 0.0,
            end: 0.25,
            duration: 1.25,
        };
        assert_eq!(sp.to_string(), "ramp 0.000000 0.250000 1.250000 0");
    }

    #[test]
    fn test_waveforms_render() {
        let square = Setpoint::Square {
            min: -1.0,
            max: 1.0,
            period: 2.0,
            phase: 0.0,
        };
        assert_eq!(
            square.to_string(),
            "square -1.000000 1.000000 2.000000 0.000000"
        );

        let sine = Setpoint::Sine {
            min: 0.0,
            max: 0.5,
            period: 1.0,
            phase: 0.25,
        };
        assert_eq!(sine.to_string(), "sine 0.000000 0.500000 1.000000 0.250000");

        let triangle = Setpoint::Triangle {
            min: 0.0,
            max: 1.0,
            period: 4.0,
            phase: 0.5,
        };
        assert_eq!(
            triangle.to_string(),
            "triangle 0.000000 1.000000 4.000000 0.500000"
        );
    }

    #[test]
    fn test_constant_render() {
        assert_eq!(Setpoint::Constant(-35.0).to_string(), "-35.000000");
    }
}
