//! Cancellation: shared cancel handles and a registry of in-flight operations.
//!
//! A `CancelHandle` reaches the engine through the operation context.
//! Cancelling it aborts the in-flight network call
//! (the transport polls it) or the pending retry delay (both waits observe
//! it). `OperationControl` lets a supervisor, e.g. a Ctrl-C handler, cancel
//! operations it did not start by client request id.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
    notify: tokio::sync::Notify,
}

/// Cloneable cancellation token; all clones observe the same state.
#[derive(Clone, Default)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        {
            let _guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        }
        self.inner.cond.notify_all();
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Blocks for up to `timeout`. Returns true if cancelled (possibly early),
    /// false if the full timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.is_cancelled() {
                return true;
            }
            let wait = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return false;
                    }
                    d - now
                }
                None => Duration::from_secs(3600),
            };
            guard = self
                .inner
                .cond
                .wait_timeout(guard, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Completes once the handle is cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Shared registry of client request id -> cancel handle for operations
/// with an attempt in flight.
#[derive(Default)]
pub struct OperationControl {
    operations: RwLock<HashMap<String, CancelHandle>>,
}

impl OperationControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an attempt; it stays registered until the returned guard drops.
    pub fn register(self: &Arc<Self>, id: &str, handle: &CancelHandle) -> Registration {
        self.operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), handle.clone());
        Registration {
            control: Arc::clone(self),
            id: id.to_string(),
        }
    }

    fn unregister(&self, id: &str) {
        self.operations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Cancel one operation. Returns false if nothing is registered under `id`.
    pub fn cancel(&self, id: &str) -> bool {
        match self
            .operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
        {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel everything currently registered; returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let ops = self.operations.read().unwrap_or_else(PoisonError::into_inner);
        for handle in ops.values() {
            handle.cancel();
        }
        ops.len()
    }

    pub fn in_flight(&self) -> usize {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for OperationControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationControl")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Unregisters an attempt from `OperationControl` when dropped.
pub struct Registration {
    control: Arc<OperationControl>,
    id: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.control.unregister(&self.id);
    }
}
