//! Cancellation and deadline handling for store calls

use std::future::Future;
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Bounds every store call made during one reconcile.
///
/// A call is abandoned as soon as the shared token is cancelled or the
/// reconcile's deadline passes, and no later call is started.
#[derive(Clone, Debug)]
pub struct CallScope {
    cancel: CancellationToken,
    deadline: Instant,
}

impl CallScope {
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self {
            cancel,
            deadline: Instant::now() + timeout,
        }
    }

    /// Run one store call inside the scope
    pub async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(Error::DeadlineExceeded);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            res = timeout_at(self.deadline, fut) => match res {
                Ok(inner) => inner,
                Err(_) => Err(Error::DeadlineExceeded),
            },
        }
    }
}
