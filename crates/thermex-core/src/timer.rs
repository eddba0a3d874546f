//! Cancelable scheduled work.
//!
//! [`call_later`] and [`call_periodic`] spawn a task and return a
//! [`ScheduledTask`] handle that cancels it. The watchdog and the delayed
//! turn-off helper are both built on these.
//!
//! Dropping a handle detaches the task; it keeps running until it finishes
//! or someone cancels it through another clone of its token.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a scheduled unit of work.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Cancel the task. No-op if it already finished.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the task has run to completion or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the task and wait until it has stopped.
    pub async fn cancel_and_wait(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

/// Run `f` once after `delay` unless cancelled first.
///
/// Cancellation also interrupts `f` if it is already running.
pub fn call_later<F, Fut>(delay: Duration, f: F) -> ScheduledTask
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let child = token.clone();
    let handle = tokio::spawn(async move {
        tokio::select! {
            _ = child.cancelled() => {}
            _ = async {
                tokio::time::sleep(delay).await;
                f().await;
            } => {}
        }
    });
    ScheduledTask { token, handle }
}

/// Run `f` every `period`, starting one period from now, until cancelled.
///
/// A slow run delays the following ones instead of letting them pile up.
pub fn call_periodic<F, Fut>(period: Duration, mut f: F) -> ScheduledTask
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let child = token.clone();
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = child.cancelled() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                _ = child.cancelled() => break,
                _ = f() => {}
            }
        }
    });
    ScheduledTask { token, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_call_later_fires() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let task = call_later(Duration::from_secs(60), move || async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_later_cancelled() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let task = call_later(Duration::from_secs(60), move || async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(30)).await;
        task.cancel();
        assert!(task.is_cancelled());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        task.cancel_and_wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_periodic() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let task = call_periodic(Duration::from_secs(10), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        task.cancel_and_wait().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
