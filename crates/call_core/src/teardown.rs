//! Shutdown barrier for fire-and-forget teardown work.
//!
//! Components that still have an in-flight final step (a last hangup RPC, a
//! log flush on a worker) hold a [`TeardownToken`]; [`TeardownBarrier::wait`]
//! completes only once every outstanding token has dropped, so the process
//! does not exit mid-teardown.

use tokio::sync::{mpsc, Mutex};

pub struct TeardownBarrier {
    tx: Mutex<Option<mpsc::Sender<()>>>,
    rx: Mutex<Option<mpsc::Receiver<()>>>,
}

/// Single-use release token; releasing is dropping.
pub struct TeardownToken {
    _tx: mpsc::Sender<()>,
}

impl TeardownBarrier {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// A token issued after `wait` began is inert and blocks nothing.
    pub async fn token(&self) -> TeardownToken {
        let guard = self.tx.lock().await;
        match guard.as_ref() {
            Some(tx) => TeardownToken { _tx: tx.clone() },
            None => {
                let (tx, _rx) = mpsc::channel(1);
                TeardownToken { _tx: tx }
            }
        }
    }

    /// Blocks until every outstanding token has been released. Idempotent;
    /// later calls return immediately.
    pub async fn wait(&self) {
        drop(self.tx.lock().await.take());
        let rx = self.rx.lock().await.take();
        if let Some(mut rx) = rx {
            // recv yields None once the last sender clone is gone.
            while rx.recv().await.is_some() {}
        }
    }
}

impl Default for TeardownBarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_with_no_tokens() {
        let barrier = TeardownBarrier::new();
        tokio::time::timeout(Duration::from_secs(1), barrier.wait())
            .await
            .expect("wait should not block");
    }

    #[tokio::test]
    async fn wait_blocks_until_last_token_drops() {
        let barrier = Arc::new(TeardownBarrier::new());
        let token_a = barrier.token().await;
        let token_b = barrier.token().await;

        let waiter = {
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move { barrier.wait().await })
        };

        drop(token_a);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(token_b);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("barrier released")
            .expect("waiter task");
    }

    #[tokio::test]
    async fn tokens_issued_after_wait_are_inert() {
        let barrier = TeardownBarrier::new();
        barrier.wait().await;
        let _token = barrier.token().await;
        tokio::time::timeout(Duration::from_secs(1), barrier.wait())
            .await
            .expect("second wait should not block");
    }
}
