//! A minimal, explicitly-passed cancellation/deadline handle.
//!
//! Rather than pull in `tokio-util` for a single type, this mirrors the
//! `Notify` + atomic-flag shape used for the shutdown broadcast elsewhere
//! in this crate. Cancellation here is a first-class parameter threaded
//! through pipeline/upstream calls, never a global.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Clone)]
pub struct Cancel {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    deadline: Option<Instant>,
}

impl Cancel {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                deadline: None,
            }),
        }
    }

    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
                deadline: Some(Instant::now() + timeout),
            }),
        }
    }

    /// A child cancel handle with no deadline of its own, cancelled when
    /// the parent is cancelled. Used to derive a per-query `Cancel` from
    /// a server's root shutdown handle.
    pub fn child(&self) -> Self {
        let child = Self::new();
        if self.is_cancelled() {
            child.cancel();
        } else {
            let parent = self.clone();
            let child_handle = child.clone();
            tokio::spawn(async move {
                parent.cancelled().await;
                child_handle.cancel();
            });
        }
        child
    }

    /// A child cancel handle that is cancelled when either the parent is
    /// cancelled or the (possibly sooner) local deadline elapses — used by
    /// parallel branches, which take "the ambient deadline if sooner".
    pub fn child_with_deadline(&self, timeout: Duration) -> Self {
        let local_deadline = Instant::now() + timeout;
        let deadline = match self.inner.deadline {
            Some(parent) if parent < local_deadline => Some(parent),
            _ => Some(local_deadline),
        };
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(self.is_cancelled()),
                notify: Notify::new(),
                deadline,
            }),
        }
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
            || self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once cancelled or the deadline elapses, whichever first.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        match self.inner.deadline {
            Some(deadline) => {
                let sleep = tokio::time::sleep_until(deadline);
                tokio::pin!(sleep);
                tokio::select! {
                    _ = &mut sleep => {}
                    _ = self.inner.notify.notified() => {}
                }
            }
            None => self.inner.notify.notified().await,
        }
    }
}

impl Default for Cancel {
    fn default() -> Self {
        Self::new()
    }
}
