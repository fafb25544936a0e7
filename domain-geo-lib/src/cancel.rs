//! Shared cancellation signal for one scan run.
//!
//! Every unit of work holds a clone. Cancelling any clone wakes every task
//! waiting in [`ScanCancellation::cancelled`].

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Cloneable, one-way cancellation flag.
#[derive(Debug, Clone)]
pub struct ScanCancellation {
    state: Arc<watch::Sender<bool>>,
}

impl ScanCancellation {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Flip the flag. Idempotent.
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    /// Check if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once the flag is set; immediately if it already is.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Cancel this signal on Ctrl-C.
    ///
    /// Spawns a listener task on the current runtime. If the handler cannot
    /// be installed the run simply cannot be interrupted this way.
    pub fn cancel_on_ctrl_c(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl-C, cancelling scan...");
                    signal.cancel();
                }
                Err(e) => tracing::warn!("Failed to register Ctrl-C handler: {}", e),
            }
        });
    }
}

impl Default for ScanCancellation {
    fn default() -> Self {
        Self::new()
    }
}
