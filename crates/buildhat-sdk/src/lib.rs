//! Build HAT SDK - Raspberry Pi Build HAT 的 Rust SDK
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 命令渲染、上行行分类、固件校验和与帧格式
//! - **传输层** (`serial`): 串口与 mock 传输
//! - **驱动层** (`driver`): 读线程、应答关联、端口状态表
//! - **客户端层** (`client`): 板级初始化、固件更新、电机与运动规划
//!
//! # 快速开始
//!
//! ```no_run
//! use buildhat_sdk::prelude::*;
//!
//! buildhat_sdk::logging::init_logging("info").unwrap();
//! let hat = HatBuilder::new().build().unwrap();
//! let motor = hat.motor(Port::A).unwrap();
//! motor.run_for_seconds(2.0, 50.0, &RunOptions::blocking()).unwrap();
//! ```

pub mod logging;
pub mod prelude;

pub use buildhat_client as client;
pub use buildhat_driver as driver;
pub use buildhat_protocol as protocol;
pub use buildhat_serial as serial;

pub use buildhat_client::{BuildHat, HatBuilder, HatError};
pub use buildhat_driver::DriverError;
pub use buildhat_protocol::{Port, ProtocolError};

/// 驱动层句柄的别名
pub type Driver = buildhat_driver::Hat;
