use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Where a background service currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Running,
    Stopped,
}

struct Inner {
    state: ServiceState,
    cancel: Option<CancellationToken>,
}

/// Run/stop state machine shared by the streaming services
///
/// Transitions happen under one mutex, so racing `start`/`stop` calls end
/// either fully running or fully stopped. Every start gets a fresh token;
/// a stopped service can be started again.
pub struct Lifecycle {
    name: &'static str,
    inner: Mutex<Inner>,
}

impl Lifecycle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(Inner {
                state: ServiceState::Idle,
                cancel: None,
            }),
        }
    }

    pub fn state(&self) -> ServiceState {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServiceState::Running
    }

    /// Spawns the future built by `launch` unless the service already runs
    ///
    /// `launch` is called under the lock, so anything it does synchronously
    /// (such as subscribing to a stream) happens before `start` returns.
    /// Returns false when the service was already running.
    pub fn start<F, Fut>(&self, launch: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.state == ServiceState::Running {
            debug!(service = self.name, "Service already running");
            return false;
        }

        let cancel = CancellationToken::new();
        tokio::spawn(launch(cancel.clone()));

        inner.cancel = Some(cancel);
        inner.state = ServiceState::Running;
        info!(service = self.name, "Service started");
        true
    }

    /// Cancels the running loop and parks the service in `resting`
    ///
    /// Returns false when the service was not running.
    pub fn stop(&self, resting: ServiceState) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.state != ServiceState::Running {
            return false;
        }

        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        // The loop exits on its own at the next select; nothing to await here.
        inner.state = resting;
        info!(service = self.name, state = ?resting, "Service stopped");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_start_twice_spawns_once() {
        let lifecycle = Lifecycle::new("test");
        let launches = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let launches = Arc::clone(&launches);
            lifecycle.start(move |token| {
                launches.fetch_add(1, Ordering::SeqCst);
                async move { token.cancelled().await }
            });
        }

        assert_eq!(launches.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state(), ServiceState::Running);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_cancels() {
        let lifecycle = Lifecycle::new("test");
        let (tx, rx) = tokio::sync::oneshot::channel();

        lifecycle.start(move |token| async move {
            token.cancelled().await;
            let _ = tx.send(());
        });

        assert!(lifecycle.stop(ServiceState::Stopped));
        assert!(!lifecycle.stop(ServiceState::Stopped));
        assert_eq!(lifecycle.state(), ServiceState::Stopped);

        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("loop should observe cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn test_restart_gets_fresh_token() {
        let lifecycle = Lifecycle::new("test");
        lifecycle.start(|token| async move { token.cancelled().await });
        lifecycle.stop(ServiceState::Idle);

        let (tx, mut rx) = tokio::sync::oneshot::channel::<bool>();
        assert!(lifecycle.start(move |token| async move {
            let _ = tx.send(token.is_cancelled());
            token.cancelled().await;
        }));

        let was_cancelled = tokio::time::timeout(Duration::from_secs(1), &mut rx)
            .await
            .unwrap()
            .unwrap();
        assert!(!was_cancelled);
        lifecycle.stop(ServiceState::Idle);
    }

    #[test]
    fn test_new_lifecycle_is_idle() {
        let lifecycle = Lifecycle::new("test");
        assert_eq!(lifecycle.state(), ServiceState::Idle);
        assert!(!lifecycle.stop(ServiceState::Stopped));
        assert_eq!(lifecycle.state(), ServiceState::Idle);
    }
}
