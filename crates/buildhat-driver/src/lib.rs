//! # Build HAT Driver
//!
//! 驱动层：读线程、应答关联、端口状态跟踪。
//!
//! - 读线程独占传输层读端，把上行文本切行、分类并分发
//! - 端口状态表、应答注册表、传感器缓存共用一把 `RwLock`（[`HatContext`]）
//! - 请求按类别（以及端口）FIFO 关联：设备不给应答附加请求 ID
//! - 钩子系统：每一行收发文本都可以被回调观察（见 [`hooks`]）
//!
//! 大多数用户应该使用 `buildhat-client` 提供的电机与板级接口。

mod builder;
pub mod dispatcher;
mod error;
mod hat;
pub mod hooks;
pub mod metrics;
pub mod recording;
pub mod registry;
pub mod state;

pub use builder::DriverBuilder;
pub use dispatcher::{DispatcherConfig, LineAssembler, dispatch_line, reader_loop};
pub use error::DriverError;
pub use hat::Hat;
pub use hooks::{HookManager, LineCallback};
pub use metrics::{HatMetrics, MetricsSnapshot};
pub use recording::{LineDirection, LineRecorder, RecordedLine};
pub use registry::{PendingRegistry, Reply, RequestKey, Waiter};
pub use state::{ConnectionState, DeviceKind, HatContext, HatState, LinkKind};
