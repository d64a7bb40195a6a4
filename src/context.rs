//! Cancellation and deadline propagation
//!
//! A `Context` is threaded through every backend call made by the
//! filesystem and its file handles. Cancelling it (or letting its deadline
//! pass) aborts the in-flight request; work already completed by a
//! multi-object operation is not rolled back.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{BucketFsError, Result};

#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    /// Build a context around an existing cancellation token
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a context whose deadline is `timeout` from now.
    ///
    /// An existing earlier deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            token: self.token.clone(),
            deadline: Some(deadline),
        }
    }

    /// Derive a context that is cancelled with this one but can also be
    /// cancelled on its own
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail fast if the context is already done
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(BucketFsError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(BucketFsError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Run a backend future, aborting it if the context is cancelled or
    /// its deadline passes first
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(BucketFsError::Cancelled),
                    _ = tokio::time::sleep_until(deadline) => Err(BucketFsError::DeadlineExceeded),
                    res = fut => res,
                }
            }
            None => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Err(BucketFsError::Cancelled),
                    res = fut => res,
                }
            }
        }
    }
}
