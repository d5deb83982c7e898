//! Fixed-delay retry loop shared by the write path and the connection path.
//!
//! A [`Retry`] runs an async operation until it succeeds. There is no attempt
//! limit and the delay never grows. An optional [`CancellationToken`] stops
//! the loop: it is checked before every attempt and raced against every
//! sleep, but an attempt already in progress always runs to completion.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use shadelink::retry::Retry;
//! use shadelink::LinkError;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let retry = Retry::new(Duration::from_millis(1));
//! let value = retry
//!     .run(
//!         |attempt| async move {
//!             if attempt < 3 {
//!                 Err(LinkError::WriteFailed("busy".into()))
//!             } else {
//!                 Ok(attempt)
//!             }
//!         },
//!         |_, _| {},
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(value, 3);
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{LinkError, Result};

/// Retry policy: fixed delay, unbounded attempts, optional cancellation.
#[derive(Debug, Clone)]
pub struct Retry {
    delay: Duration,
    cancel: Option<CancellationToken>,
}

impl Retry {
    /// Create a policy with the given delay between attempts.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            cancel: None,
        }
    }

    /// Stop retrying once `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Delay between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Check if the cancellation token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Sleep for one delay period.
    ///
    /// Returns `Err(Cancelled)` as soon as the token fires.
    pub async fn pause(&self) -> Result<()> {
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(LinkError::Cancelled),
                _ = tokio::time::sleep(self.delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(self.delay).await;
                Ok(())
            }
        }
    }

    /// Run `operation` until it succeeds.
    ///
    /// `operation` receives the 1-based attempt number. After each failure
    /// `on_failure(attempt, &error)` is called, then the loop sleeps for the
    /// delay. A `Cancelled` error from the operation itself ends the loop.
    ///
    /// # Errors
    ///
    /// Only `Cancelled`, when the token fires before an attempt or during a
    /// sleep.
    pub async fn run<T, F, Fut, N>(&self, mut operation: F, mut on_failure: N) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
        N: FnMut(u32, &LinkError),
    {
        let mut attempt: u32 = 1;
        loop {
            if self.is_cancelled() {
                return Err(LinkError::Cancelled);
            }

            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(LinkError::Cancelled) => return Err(LinkError::Cancelled),
                Err(e) => on_failure(attempt, &e),
            }

            self.pause().await?;
            attempt = attempt.saturating_add(1);
        }
    }
}
