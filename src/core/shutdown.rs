//! 进程级关闭：信号监听与退出前清理
//!
//! ShutdownManager 把 Ctrl+C / SIGTERM 转成取消令牌与关闭原因广播；
//! ShutdownCoordinator 在退出前依次执行已登记的清理任务（例如工厂的 cleanup），每个任务单独限时。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
    /// 运行目标已结束
    Finished,
    FatalError(String),
}

#[derive(Clone)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason_tx: broadcast::Sender<ShutdownReason>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(4);
        Self {
            token: CancellationToken::new(),
            reason_tx,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 只有第一次调用会广播原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.token.is_cancelled() {
            return;
        }
        tracing::info!(reason = ?reason, "Shutdown requested");
        let _ = self.reason_tx.send(reason);
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装 Ctrl+C 与（unix 下）SIGTERM 处理
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down agents...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, shutting down agents...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 退出前需要执行的清理
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    fn name(&self) -> &'static str;
}

pub struct ShutdownCoordinator {
    manager: Arc<ShutdownManager>,
    tasks: Vec<Arc<dyn ShutdownCleanup>>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(manager: Arc<ShutdownManager>) -> Self {
        Self {
            manager,
            tasks: Vec::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.tasks.push(Arc::new(task));
    }

    pub fn manager(&self) -> &Arc<ShutdownManager> {
        &self.manager
    }

    /// 依次执行清理；失败或超时只记录，不中断后续任务。返回成功的任务数。
    pub async fn run_cleanup(&self) -> usize {
        let mut succeeded = 0;
        for task in &self.tasks {
            let name = task.name();
            match tokio::time::timeout(self.timeout, task.cleanup()).await {
                Ok(Ok(())) => {
                    succeeded += 1;
                    tracing::info!("Cleanup '{}' completed", name);
                }
                Ok(Err(e)) => tracing::warn!("Cleanup '{}' failed: {}", name, e),
                Err(_) => tracing::warn!(
                    "Cleanup '{}' timed out after {}ms",
                    name,
                    self.timeout.as_millis()
                ),
            }
        }
        succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCleanup(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl ShutdownCleanup for CountingCleanup {
        async fn cleanup(&self) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "Counting"
        }
    }

    struct HangingCleanup;

    #[async_trait::async_trait]
    impl ShutdownCleanup for HangingCleanup {
        async fn cleanup(&self) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "Hanging"
        }
    }

    #[test]
    fn test_shutdown_cancels_token_once() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        let mut reasons = manager.subscribe();
        assert!(!manager.is_shutdown());

        manager.shutdown(ShutdownReason::Finished);
        manager.shutdown(ShutdownReason::Signal);
        assert!(token.is_cancelled());
        assert_eq!(reasons.try_recv().unwrap(), ShutdownReason::Finished);
        assert!(reasons.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_coordinator_survives_hanging_task() {
        let manager = Arc::new(ShutdownManager::new());
        let mut coordinator =
            ShutdownCoordinator::new(manager).with_timeout(Duration::from_millis(20));
        let calls = Arc::new(AtomicUsize::new(0));
        coordinator.register(HangingCleanup);
        coordinator.register(CountingCleanup(Arc::clone(&calls)));

        assert_eq!(coordinator.run_cleanup().await, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
