//! 模拟 Build HAT 固件的 mock 设备
#![allow(dead_code)]

use buildhat_serial::{MockDevice, MockTransport};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(2);

pub const FIRMWARE_REPLY: &str = "Firmware version: 1737564117 2025-01-22T16:41:57+00:00";
pub const BOOTLOADER_REPLY: &str = "BuildHAT bootloader version 1.0 2021-04-28";
pub const RUNNING_VERSION: &str = "1737564117";

/// 模拟设备的状态
#[derive(Debug, Clone)]
pub struct SimState {
    /// 每个端口 `list` 报告的连接描述（`None` 表示无设备）
    pub devices: [Option<&'static str>; 4],
    pub bootloader: bool,
    pub answer_version: bool,
    pub answer_list: bool,
    /// 电机相对位置（度）
    pub position: [f64; 4],
    pub streaming: [bool; 4],
    pub pulse_done: bool,
    /// 为 false 时斜坡不改变位置（电机堵转）
    pub ramp_moves: bool,
    /// 为 true 时收到斜坡后停止数据流
    pub silent_after_ramp: bool,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            devices: [
                Some("connected to active ID 30"),
                Some("connected to passive ID 1"),
                None,
                Some("connected to active ID 3D"),
            ],
            bootloader: false,
            answer_version: true,
            answer_list: true,
            position: [0.0; 4],
            streaming: [false; 4],
            pulse_done: true,
            ramp_moves: true,
            silent_after_ramp: false,
        }
    }
}

pub type Shared = Arc<Mutex<SimState>>;

fn absolute(position: f64) -> f64 {
    (position + 180.0).rem_euclid(360.0) - 180.0
}

fn respond(state: &Shared, line: &str) -> Vec<String> {
    let mut sim = state.lock().unwrap();
    let mut out = Vec::new();
    let mut port = 0usize;
    for part in line.split(" ; ").map(str::trim) {
        if let Some(n) = part.strip_prefix("port ") {
            port = n.parse().unwrap();
            continue;
        }
        match part {
            "version" if sim.answer_version => out.push(
                if sim.bootloader {
                    BOOTLOADER_REPLY
                } else {
                    FIRMWARE_REPLY
                }
                .to_string(),
            ),
            "reboot" => sim.bootloader = false,
            "vin" => out.push("8.2 V".to_string()),
            "list" if sim.answer_list => {
                for (p, device) in sim.devices.iter().enumerate() {
                    out.push(match device {
                        Some(desc) => format!("P{p}: {desc}"),
                        None => format!("P{p}: no device detected"),
                    });
                }
            },
            "select" => sim.streaming[port] = false,
            _ if part.starts_with("combi 0") => sim.streaming[port] = true,
            _ if part.starts_with("select ") && !sim.streaming[port] => {
                out.push(format!("P{port}M0: 5"));
            },
            _ if part.starts_with("set ramp ") => {
                let fields: Vec<f64> = part["set ramp ".len()..]
                    .split_whitespace()
                    .map(|f| f.parse().unwrap())
                    .collect();
                if sim.ramp_moves {
                    sim.position[port] = fields[1] * 360.0;
                }
                if sim.silent_after_ramp {
                    sim.streaming[port] = false;
                }
            },
            _ if part.starts_with("set pulse ") && sim.pulse_done => {
                out.push(format!("P{port}: pulse done"));
            },
            _ => {},
        }
    }
    out
}

/// 启动模拟设备：命令应答线程 + combi 数据流线程
pub fn simulate(sim: SimState) -> (MockTransport, MockDevice, Shared) {
    let (transport, device) = MockTransport::pair();
    let state: Shared = Arc::new(Mutex::new(sim));

    let responder_state = state.clone();
    device.spawn_responder(move |line| respond(&responder_state, line));

    let stream_device = device.clone();
    let stream_state = state.clone();
    thread::spawn(move || {
        while !stream_device.is_closed() {
            let lines: Vec<String> = {
                let sim = stream_state.lock().unwrap();
                (0..4)
                    .filter(|&p| sim.streaming[p])
                    .map(|p| {
                        let pos = sim.position[p];
                        format!("P{p}C0: 0 {} {}", pos.round() as i64, absolute(pos).round() as i64)
                    })
                    .collect()
            };
            for line in lines {
                stream_device.push_line(&line);
            }
            thread::sleep(Duration::from_millis(5));
        }
    });

    (transport, device, state)
}

pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

/// 主机写入的命令中是否有一条与 `command` 完全相同
pub fn has_command(device: &MockDevice, command: &str) -> bool {
    device.written_commands().iter().any(|c| c == command)
}
