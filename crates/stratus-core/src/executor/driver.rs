//! How the attempt loop waits.
//!
//! The loop is written once as an async fn. `Blocking` runs blocking work
//! inline and sleeps on the cancel handle's condvar, so a `block_on` of the
//! loop never yields. `NonBlocking` moves blocking work to tokio's blocking
//! pool and waits on a tokio timer raced against cancellation.

use std::future::{ready, Future};
use std::time::Duration;

use crate::cancel::CancelHandle;
use crate::error::{ErrorKind, StorageError};

pub(crate) trait Driver: Sync {
    /// Runs transport/body work that may block on I/O.
    fn run_blocking<F, R>(&self, f: F) -> impl Future<Output = Result<R, StorageError>> + Send
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static;

    /// Waits `delay`; resolves to true if cancelled first.
    fn delay(&self, delay: Duration, cancel: &CancelHandle) -> impl Future<Output = bool> + Send;
}

pub(crate) struct Blocking;

impl Driver for Blocking {
    fn run_blocking<F, R>(&self, f: F) -> impl Future<Output = Result<R, StorageError>> + Send
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        ready(Ok(f()))
    }

    fn delay(&self, delay: Duration, cancel: &CancelHandle) -> impl Future<Output = bool> + Send {
        ready(cancel.wait_timeout(delay))
    }
}

pub(crate) struct NonBlocking;

impl Driver for NonBlocking {
    fn run_blocking<F, R>(&self, f: F) -> impl Future<Output = Result<R, StorageError>> + Send
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        async move {
            tokio::task::spawn_blocking(f).await.map_err(|e| {
                StorageError::new(ErrorKind::Io, format!("blocking task failed: {}", e), false)
            })
        }
    }

    fn delay(&self, delay: Duration, cancel: &CancelHandle) -> impl Future<Output = bool> + Send {
        let cancel = cancel.clone();
        async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => cancel.is_cancelled(),
                _ = cancel.cancelled() => true,
            }
        }
    }
}
