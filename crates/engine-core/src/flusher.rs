use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;

/// The action run on every tick and once more after the loop has drained.
pub type FlushAction = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A background loop that runs an async action on a fixed period, plus the
/// shutdown discipline both trackers need: cancel the loop, wait for it to
/// fully exit, then run the action one final time so nothing buffered at
/// shutdown is lost.
///
/// `close` is idempotent and safe to call concurrently: only the first
/// caller drains and runs the final action, later callers return once it is
/// done.
pub struct PeriodicFlusher {
    cancel: CancellationToken,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    action: FlushAction,
}

impl PeriodicFlusher {
    /// Spawns the loop. The first tick fires one full period after spawn,
    /// not immediately.
    pub fn spawn(period: Duration, action: FlushAction) -> Self {
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let loop_action = action.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => return,
                    _ = ticker.tick() => loop_action().await,
                }
            }
        });
        Self {
            cancel,
            handle: tokio::sync::Mutex::new(Some(handle)),
            action,
        }
    }

    pub async fn close(&self) {
        let mut guard = self.handle.lock().await;
        if let Some(handle) = guard.take() {
            self.cancel.cancel();
            let _ = handle.await;
            (self.action)().await;
        }
    }
}
