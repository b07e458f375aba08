//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 订阅者，过滤规则优先取 `RUST_LOG`，
//! 未设置时使用调用方给出的默认指令；同时把 `log` 记录桥接到 `tracing`。

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// 默认过滤指令
pub const DEFAULT_DIRECTIVE: &str = "info";

/// 日志初始化错误
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("A global tracing subscriber is already installed: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("A global log logger is already installed: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

/// 构造过滤器：`RUST_LOG` 优先，否则使用 `default_directive`
pub fn env_filter(default_directive: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(default_directive)?),
    }
}

/// 安装全局日志订阅者（进程内只能成功一次）
///
/// ```no_run
/// buildhat_sdk::logging::init_logging("buildhat_driver=debug,info").unwrap();
/// ```
pub fn init_logging(default_directive: &str) -> Result<(), LoggingError> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive)?)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}
