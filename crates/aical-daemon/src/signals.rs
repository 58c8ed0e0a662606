//! Shutdown on SIGTERM / SIGINT.
//!
//! [`ShutdownListener`] turns the first termination signal into a cancelled
//! [`CancellationToken`]. The orchestrator's shutdown token is passed in so an
//! in-flight cycle stops at its next check point.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Which signal ended the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Interrupt,
}

pub struct ShutdownListener {
    token: CancellationToken,
}

impl ShutdownListener {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Installs the handlers and waits in the background.
    ///
    /// Handler installation happens before this returns, so a failure is
    /// reported to the caller instead of being lost in the task.
    #[cfg(unix)]
    pub fn spawn(&self) -> std::io::Result<tokio::task::JoinHandle<Option<Signal>>> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let token = self.token.clone();

        Ok(tokio::spawn(async move {
            let received = tokio::select! {
                _ = sigterm.recv() => Some(Signal::Terminate),
                _ = sigint.recv() => Some(Signal::Interrupt),
                _ = token.cancelled() => None,
            };
            if let Some(signal) = received {
                info!(?signal, "received signal, shutting down");
                token.cancel();
            }
            debug!("signal listener stopped");
            received
        }))
    }

    #[cfg(not(unix))]
    pub fn spawn(&self) -> std::io::Result<tokio::task::JoinHandle<Option<Signal>>> {
        let token = self.token.clone();
        Ok(tokio::spawn(async move {
            let received = tokio::select! {
                result = tokio::signal::ctrl_c() => result.ok().map(|()| Signal::Interrupt),
                _ = token.cancelled() => None,
            };
            if received.is_some() {
                info!("received Ctrl+C, shutting down");
                token.cancel();
            }
            received
        }))
    }

    /// Completes once shutdown was requested by a signal or by [`Self::trigger`].
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_cancels_shared_token() {
        let token = CancellationToken::new();
        let listener = ShutdownListener::new(token.clone());
        assert!(!listener.is_shutdown());

        listener.trigger();

        assert!(listener.is_shutdown());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn listener_task_ends_without_signal_on_trigger() {
        let listener = ShutdownListener::new(CancellationToken::new());
        let task = listener.spawn().unwrap();

        listener.trigger();

        let received = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, None);
    }

    #[tokio::test]
    async fn wait_returns_after_trigger() {
        let listener = ShutdownListener::new(CancellationToken::new());
        let token = listener.token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = tokio::time::timeout(Duration::from_millis(500), listener.wait()).await;
        assert!(result.is_ok());
    }
}
