// ABOUTME: Operator abort signal for an in-flight deployment.
// ABOUTME: A watch channel so every suspension point can race it.

use std::sync::Arc;
use tokio::sync::watch;

/// Trigger side, held by the lock table so operators can reach it.
#[derive(Debug, Clone)]
pub struct AbortHandle(Arc<watch::Sender<bool>>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.send_replace(true);
    }
}

/// Listening side, passed into transitions.
#[derive(Debug, Clone)]
pub struct AbortSignal(watch::Receiver<bool>);

pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle(Arc::new(tx)), AbortSignal(rx))
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_, signal) = abort_pair();
        signal
    }

    pub fn is_aborted(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once abort is requested; pends forever if it never can be.
    pub async fn aborted(&self) {
        let mut rx = self.0.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
