//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use buildhat_sdk::prelude::*;
//! ```

// 客户端层（推荐使用）
pub use buildhat_client::{
    BuildHat, CancelToken, Direction, HatBuilder, HatConfig, Motor, MotorReading, RunOptions,
};

// 协议层
pub use buildhat_protocol::{ModeSelector, Port, SensorReading, SensorValue};

// 驱动层（高级用户使用）
pub use buildhat_driver::{ConnectionState, DeviceKind, Hat as Driver, LineCallback};

// 错误类型
pub use buildhat_client::HatError;
pub use buildhat_driver::DriverError;
pub use buildhat_protocol::ProtocolError;
pub use buildhat_serial::TransportError;
