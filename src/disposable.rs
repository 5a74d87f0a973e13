//! Teardown handles for background work.
//!
//! Every observer, debounce loop, and viewport listener the engine starts is
//! owned by a [`Disposable`]. Disposing (or dropping) it cancels the task, so a
//! page teardown stops all pending work deterministically.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct Disposable {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Disposable {
    /// Run `fut` on the current `LocalSet` until it finishes or the handle is
    /// disposed.
    pub fn spawn_local<Fut>(fut: Fut) -> Self
    where
        Fut: Future<Output = ()> + 'static,
    {
        let token = CancellationToken::new();
        let guard = token.clone();
        let task = tokio::task::spawn_local(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = fut => {}
            }
        });
        Self {
            token,
            task: Some(task),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn dispose(self) {
        self.token.cancel();
    }

    /// Cancel and wait for the task to wind down.
    pub async fn dispose_and_wait(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "disposed task did not finish cleanly");
            }
        }
    }
}

impl Drop for Disposable {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn dispose_stops_pending_work() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let ticks = Rc::new(Cell::new(0));
                let counter = ticks.clone();
                let handle = Disposable::spawn_local(async move {
                    loop {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        counter.set(counter.get() + 1);
                    }
                });

                tokio::time::sleep(Duration::from_millis(35)).await;
                assert_eq!(ticks.get(), 3);
                handle.dispose_and_wait().await;

                tokio::time::sleep(Duration::from_millis(100)).await;
                assert_eq!(ticks.get(), 3);
            })
            .await;
    }

    #[tokio::test]
    async fn drop_cancels() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let handle = Disposable::spawn_local(std::future::pending());
                let token = handle.token.clone();
                assert!(!handle.is_disposed());
                drop(handle);
                assert!(token.is_cancelled());
            })
            .await;
    }
}
