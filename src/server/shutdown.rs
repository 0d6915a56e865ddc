use tokio::sync::oneshot;

/// The server keeps serving until the handle is dropped.
pub(crate) fn shutdown_signal() -> (RpcServerShutdownHandle, RpcServerShutdownSignal) {
    let (tx, rx) = oneshot::channel();

    (RpcServerShutdownHandle { _tx: tx }, RpcServerShutdownSignal { rx })
}

pub(crate) struct RpcServerShutdownHandle {
    _tx: oneshot::Sender<()>,
}

pub(crate) struct RpcServerShutdownSignal {
    rx: oneshot::Receiver<()>,
}

impl RpcServerShutdownSignal {
    /// Resolves once the handle is gone.
    pub(crate) async fn wait(self) {
        // Err just means the handle was dropped without sending, which is the normal path.
        let _ = self.rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{self, Duration};

    #[tokio::test]
    async fn signal_fires_when_handle_dropped() {
        let (handle, signal) = shutdown_signal();
        let waiter = tokio::spawn(signal.wait());

        time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(handle);
        time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }
}
