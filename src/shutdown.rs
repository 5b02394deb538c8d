// Process-wide shutdown signal. Loops select on `wait` next to their timers.

use tokio::sync::watch;

pub type ShutdownTx = watch::Sender<bool>;
pub type ShutdownRx = watch::Receiver<bool>;

pub fn channel() -> (ShutdownTx, ShutdownRx) {
    watch::channel(false)
}

/// Resolves once shutdown is triggered or the sender is gone.
pub async fn wait(rx: &mut ShutdownRx) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Like `wait`, but never resolves without a receiver.
pub async fn wait_opt(rx: &mut Option<ShutdownRx>) {
    match rx {
        Some(rx) => wait(rx).await,
        None => std::future::pending().await,
    }
}
