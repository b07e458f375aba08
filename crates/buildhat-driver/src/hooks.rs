//! 钩子系统
//!
//! 在读线程收到每一行、以及每条命令写出之后触发自定义回调，
//! 用于流量录制、调试输出等。
//!
//! 回调在读线程（或发送命令的调用线程）上同步执行，必须非阻塞：
//! 推荐把数据 `try_send` 到通道，在别的线程处理。

use std::sync::Arc;

/// 行回调
///
/// ```rust
/// use buildhat_driver::hooks::LineCallback;
/// use crossbeam_channel::Sender;
///
/// struct Tap {
///     sender: Sender<String>,
/// }
///
/// impl LineCallback for Tap {
///     fn on_line_received(&self, line: &str) {
///         let _ = self.sender.try_send(line.to_string());
///     }
/// }
/// ```
pub trait LineCallback: Send + Sync {
    /// 读线程收到一行（已去掉行结束符）时调用
    fn on_line_received(&self, line: &str);

    /// 命令成功写出后调用（不含结尾 CR）
    ///
    /// 默认不处理。
    fn on_command_sent(&self, command: &str) {
        let _ = command;
    }
}

/// 钩子管理器
///
/// 回调列表本身不做同步，由 `HatContext` 中的 `RwLock` 保护。
#[derive(Default)]
pub struct HookManager {
    callbacks: Vec<Arc<dyn LineCallback>>,
}

impl HookManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn add_callback(&mut self, callback: Arc<dyn LineCallback>) {
        self.callbacks.push(callback);
    }

    pub fn clear(&mut self) {
        self.callbacks.clear();
    }

    /// 触发所有接收回调（在读线程中调用）
    pub fn trigger_all(&self, line: &str) {
        for callback in self.callbacks.iter() {
            callback.on_line_received(line);
        }
    }

    /// 触发所有发送回调
    pub fn trigger_all_sent(&self, command: &str) {
        for callback in self.callbacks.iter() {
            callback.on_command_sent(command);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl std::fmt::Debug for HookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookManager")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{Sender, bounded};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct TestCallback {
        tx: Sender<String>,
        count: Arc<AtomicU64>,
    }

    impl LineCallback for TestCallback {
        fn on_line_received(&self, line: &str) {
            let _ = self.tx.try_send(line.to_string());
            self.count.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_hook_manager_add_callback() {
        let mut hooks = HookManager::new();
        assert!(hooks.is_empty());

        let (tx, _rx) = bounded(10);
        hooks.add_callback(Arc::new(TestCallback {
            tx,
            count: Arc::new(AtomicU64::new(0)),
        }));
        assert_eq!(hooks.len(), 1);

        hooks.clear();
        assert!(hooks.is_empty());
    }

    #[test]
    fn test_hook_manager_trigger_all() {
        let mut hooks = HookManager::new();
        let (tx, rx) = bounded(10);
        let count = Arc::new(AtomicU64::new(0));
        hooks.add_callback(Arc::new(TestCallback {
            tx,
            count: count.clone(),
        }));

        hooks.trigger_all("P0: ramp done");
        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(rx.try_recv().unwrap(), "P0: ramp done");
    }

    #[test]
    fn test_default_sent_callback_is_noop() {
        let mut hooks = HookManager::new();
        let (tx, rx) = bounded(10);
        let count = Arc::new(AtomicU64::new(0));
        hooks.add_callback(Arc::new(TestCallback {
            tx,
            count: count.clone(),
        }));

        hooks.trigger_all_sent("vin");
        assert_eq!(count.load(Ordering::Relaxed), 0);
        assert!(rx.try_recv().is_err());
    }
}
