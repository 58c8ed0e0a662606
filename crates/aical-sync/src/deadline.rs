//! Cycle deadline and cancellation.
//!
//! A [`Deadline`] is created once per cycle and passed by reference to every
//! step. Steps call [`Deadline::check`] before each store call and wrap
//! gateway calls in [`Deadline::race`], so a hung network call is abandoned
//! while an in-flight store transaction always runs to completion.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{SyncError, SyncResult};

/// Point in time after which a cycle must stop, plus a cancellation token.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    token: CancellationToken,
}

impl Deadline {
    /// A deadline `timeout` from now with a fresh token.
    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    pub fn at(at: Instant) -> Self {
        Self {
            at,
            token: CancellationToken::new(),
        }
    }

    /// Builder: use `token` for cancellation.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Fails if the cycle was cancelled or the deadline has passed.
    pub fn check(&self) -> SyncResult<()> {
        if self.token.is_cancelled() {
            Err(SyncError::Cancelled)
        } else if Instant::now() >= self.at {
            Err(SyncError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Runs `fut` until it completes, the deadline passes, or the token fires.
    ///
    /// The outer result reports the deadline, the inner one is the future's
    /// own output.
    pub async fn race<F, T, E>(&self, fut: F) -> SyncResult<Result<T, E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(SyncError::Cancelled),
            result = tokio::time::timeout_at(self.at, fut) => {
                result.map_err(|_| SyncError::DeadlineExceeded)
            }
        }
    }
}
