//! Failure-aware client pool.
//!
//! - [`ResourcePool`]: a FIFO of interchangeable handles. `acquire` waits when it is empty.
//! - [`Recorder`]: decides, after each call, whether and when a handle goes back.
//! - [`PoolDispatch`]: terminal service that ties the two together.
//!
//! The pool has no release operation of its own. A handle leaves the pool on `acquire` and only
//! comes back when a recorder returns it, optionally after a cooldown; a recorder that keeps
//! it withdraws it for good.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use outbound::pool::{DropOnSustainedFailure, Handle, PoolDispatch, ResourcePool};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = ResourcePool::new();
//! pool.add((0..4).map(|_| Handle::new(reqwest::Client::new())));
//!
//! let recorder = DropOnSustainedFailure::builder()
//!     .failure_threshold(3)
//!     .failure_cooldown(Duration::from_secs(5))
//!     .build()?;
//! let dispatch = PoolDispatch::new(pool, recorder);
//! # let _ = dispatch;
//! # Ok(()) }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinSet;

use crate::{Sleeper, TokioSleeper};

pub mod dispatch;
pub mod handle;
pub mod recorder;
pub mod tracker;

pub use dispatch::PoolDispatch;
pub use handle::Handle;
pub use recorder::{AlwaysReturn, DropOnSustainedFailure, DropOnSustainedFailureBuilder, Recorder};
pub use tracker::FailureTracker;

struct PoolState<H> {
    handles: Mutex<VecDeque<H>>,
    available: Notify,
    returns: Mutex<JoinSet<()>>,
    closed: AtomicBool,
    sleeper: Arc<dyn Sleeper>,
}

/// Bounded set of interchangeable handles, handed out in FIFO order.
///
/// Cloning is cheap; clones share the same pool.
pub struct ResourcePool<H> {
    state: Arc<PoolState<H>>,
}

impl<H> Clone for ResourcePool<H> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone() }
    }
}

impl<H> fmt::Debug for ResourcePool<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("available", &self.len())
            .field("pending_returns", &self.lock_returns().len())
            .field("closed", &self.state.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl<H> Default for ResourcePool<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> ResourcePool<H> {
    /// Empty pool whose scheduled returns wait on the tokio timer.
    pub fn new() -> Self {
        Self::with_sleeper(TokioSleeper)
    }

    /// Empty pool whose scheduled returns wait on `sleeper`.
    pub fn with_sleeper<S: Sleeper + 'static>(sleeper: S) -> Self {
        let state = PoolState {
            handles: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            returns: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
            sleeper: Arc::new(sleeper),
        };
        Self { state: Arc::new(state) }
    }

    fn lock_handles(&self) -> MutexGuard<'_, VecDeque<H>> {
        self.state.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_returns(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.state.returns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append handles and wake one waiter per handle.
    pub fn add<I>(&self, handles: I)
    where
        I: IntoIterator<Item = H>,
    {
        let added = {
            let mut pool = self.lock_handles();
            let before = pool.len();
            pool.extend(handles);
            pool.len() - before
        };
        for _ in 0..added {
            self.state.available.notify_one();
        }
    }

    /// Take the head handle without waiting.
    pub fn try_acquire(&self) -> Option<H> {
        self.lock_handles().pop_front()
    }

    /// Take the head handle, waiting until one is added if the pool is empty.
    ///
    /// Cancel safe: dropping the future never loses a handle.
    pub async fn acquire(&self) -> H {
        loop {
            let notified = self.state.available.notified();
            tokio::pin!(notified);
            // register before checking so an `add` between the check and the await still wakes us
            notified.as_mut().enable();
            if let Some(handle) = self.try_acquire() {
                return handle;
            }
            notified.await;
        }
    }

    /// Handles currently in the pool.
    pub fn len(&self) -> usize {
        self.lock_handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scheduled returns that have not fired yet.
    pub fn pending_returns(&self) -> usize {
        let mut returns = self.lock_returns();
        while returns.try_join_next().is_some() {}
        returns.len()
    }

    /// Cancel every pending scheduled return and refuse new ones.
    ///
    /// Handles already in the pool stay available. Returns the number of returns aborted.
    pub fn shutdown(&self) -> usize {
        let pending = {
            let mut returns = self.lock_returns();
            self.state.closed.store(true, Ordering::Release);
            std::mem::take(&mut *returns)
        };
        let aborted = pending.len();
        // dropping a JoinSet aborts its tasks
        drop(pending);
        if aborted > 0 {
            tracing::debug!(aborted, "pool shut down with pending returns");
        }
        aborted
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }
}

impl<H: Send + 'static> ResourcePool<H> {
    /// Put `handle` back after `delay` on a background task.
    ///
    /// After [`shutdown`](Self::shutdown) the handle is dropped instead.
    pub fn add_after(&self, handle: H, delay: Duration) {
        // `shutdown` flips `closed` under the same lock
        let mut returns = self.lock_returns();
        if self.state.closed.load(Ordering::Acquire) {
            tracing::debug!("pool is shut down, discarding returned handle");
            return;
        }
        if delay.is_zero() {
            drop(returns);
            self.add([handle]);
            return;
        }
        let pool = self.clone();
        let sleep = self.state.sleeper.sleep(delay);
        while returns.try_join_next().is_some() {}
        returns.spawn(async move {
            sleep.await;
            pool.add([handle]);
        });
    }
}
