use std::sync::Arc;

use tokio::sync::watch;

use super::{Monitor, MonitorKind};

/// Create a linked pair of cancellation handle and listener
pub fn channel() -> (CancelHandle, CancelListener) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(Arc::new(tx)), CancelListener(rx))
}

/// Requests cancellation of one execution, cheap to clone
#[derive(Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    /// return false if cancellation was already requested
    pub fn cancel(&self) -> bool {
        !self.0.send_replace(true)
    }
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

pub struct CancelListener(watch::Receiver<bool>);

impl Monitor for CancelListener {
    type Resource = bool;

    async fn wait_exhaust(&mut self) -> MonitorKind {
        if self.0.wait_for(|cancelled| *cancelled).await.is_err() {
            // every handle dropped without cancelling
            std::future::pending::<()>().await;
        }
        MonitorKind::Cancelled
    }
    fn poll_exhaust(&mut self) -> Option<MonitorKind> {
        self.stat().then_some(MonitorKind::Cancelled)
    }
    fn stat(&self) -> Self::Resource {
        *self.0.borrow()
    }
}
