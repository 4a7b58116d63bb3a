//! Cancellable recurring timer.
//!
//! The callback fires once per `interval` and the timer re-arms itself
//! until [`PeriodicTimer::cancel`] is called or the handle is dropped.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ChatError;

/// A recurring timer running on the current Tokio runtime.
#[derive(Debug)]
pub struct PeriodicTimer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicTimer {
    /// Arm a timer that calls `on_tick` every `interval`.
    ///
    /// Fails with [`ChatError::NoRuntime`] outside of a Tokio runtime.
    pub fn start<F>(interval: Duration, on_tick: F) -> Result<Self, ChatError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ChatError::NoRuntime)?;
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = runtime.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                on_tick();
                // The callback may have cancelled us (e.g. by closing the socket).
                if cancelled.is_cancelled() {
                    break;
                }
            }
        });

        Ok(Self { token, handle })
    }

    /// Stop the timer permanently. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `true` once the timer task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn rearms_until_cancelled() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let timer = PeriodicTimer::start(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(ticks.load(Ordering::SeqCst) >= 3);

        timer.cancel();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let frozen = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), frozen);
        assert!(timer.is_finished());
    }

    #[tokio::test]
    async fn drop_cancels() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let timer = PeriodicTimer::start(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        drop(timer);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn requires_runtime() {
        let result = PeriodicTimer::start(Duration::from_millis(10), || {});
        assert!(matches!(result, Err(ChatError::NoRuntime)));
    }
}
