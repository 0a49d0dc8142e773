use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::error::BuildError;
use crate::predicate::{retry_on_error, ResultPredicate};
use crate::{Error, Request, Response};

use super::tracker::FailureTracker;
use super::ResourcePool;

/// Decides what happens to a handle once its call has finished.
///
/// The recorder owns `handle` for the duration of the call: giving it back to `pool` (now or
/// later) returns it to circulation, dropping it withdraws it permanently.
pub trait Recorder<H>: Send + Sync + 'static {
    fn record(
        &self,
        pool: &ResourcePool<H>,
        handle: H,
        request: &Request,
        outcome: Result<&Response, &Error>,
    );
}

/// Returns every handle after a fixed cooldown, whatever the outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReturn {
    cooldown: Duration,
}

impl AlwaysReturn {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }
}

impl<H: Send + 'static> Recorder<H> for AlwaysReturn {
    fn record(
        &self,
        pool: &ResourcePool<H>,
        handle: H,
        _request: &Request,
        _outcome: Result<&Response, &Error>,
    ) {
        pool.add_after(handle, self.cooldown);
    }
}

/// Per-handle circuit breaker.
///
/// Counts consecutive failures per handle (a success resets the count). While the count is below
/// `failure_threshold` the handle goes back after `failure_cooldown` if this call failed, or
/// `success_cooldown` if it succeeded. Once the count reaches the threshold the handle is
/// withdrawn and never returns.
pub struct DropOnSustainedFailure<H> {
    tracker: FailureTracker<H>,
    is_failure: ResultPredicate,
    failure_threshold: usize,
    failure_cooldown: Duration,
    success_cooldown: Duration,
}

impl<H> fmt::Debug for DropOnSustainedFailure<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DropOnSustainedFailure")
            .field("failure_threshold", &self.failure_threshold)
            .field("failure_cooldown", &self.failure_cooldown)
            .field("success_cooldown", &self.success_cooldown)
            .field("is_failure", &"<predicate>")
            .finish()
    }
}

impl<H: Eq + Hash> DropOnSustainedFailure<H> {
    pub fn builder() -> DropOnSustainedFailureBuilder<H> {
        DropOnSustainedFailureBuilder::new()
    }

    /// Consecutive failures currently recorded against `handle`.
    pub fn failures(&self, handle: &H) -> usize {
        self.tracker.failures(handle)
    }
}

impl<H> Recorder<H> for DropOnSustainedFailure<H>
where
    H: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn record(
        &self,
        pool: &ResourcePool<H>,
        handle: H,
        request: &Request,
        outcome: Result<&Response, &Error>,
    ) {
        let failed = (self.is_failure)(request, outcome);
        let failures = self.tracker.record(&handle, failed);
        if failures >= self.failure_threshold {
            tracing::warn!(
                ?handle,
                failures,
                threshold = self.failure_threshold,
                "withdrawing pooled handle after sustained failures"
            );
            return;
        }
        let cooldown = if failed { self.failure_cooldown } else { self.success_cooldown };
        pool.add_after(handle, cooldown);
    }
}

/// Builder for [`DropOnSustainedFailure`].
pub struct DropOnSustainedFailureBuilder<H> {
    is_failure: ResultPredicate,
    failure_threshold: usize,
    failure_cooldown: Duration,
    success_cooldown: Duration,
    _handle: PhantomData<fn() -> H>,
}

impl<H: Eq + Hash> DropOnSustainedFailureBuilder<H> {
    /// Failure means "no response"; three strikes; no cooldowns.
    pub fn new() -> Self {
        Self {
            is_failure: Arc::new(retry_on_error()),
            failure_threshold: 3,
            failure_cooldown: Duration::ZERO,
            success_cooldown: Duration::ZERO,
            _handle: PhantomData,
        }
    }

    /// Classify a finished call as a failure.
    pub fn is_failure<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request, Result<&Response, &Error>) -> bool + Send + Sync + 'static,
    {
        self.is_failure = Arc::new(predicate);
        self
    }

    /// Consecutive failures after which a handle is withdrawn. Must be > 0.
    pub fn failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.failure_cooldown = cooldown;
        self
    }

    pub fn success_cooldown(mut self, cooldown: Duration) -> Self {
        self.success_cooldown = cooldown;
        self
    }

    pub fn build(self) -> Result<DropOnSustainedFailure<H>, BuildError> {
        if self.failure_threshold == 0 {
            return Err(BuildError::ZeroFailureThreshold);
        }
        Ok(DropOnSustainedFailure {
            tracker: FailureTracker::new(),
            is_failure: self.is_failure,
            failure_threshold: self.failure_threshold,
            failure_cooldown: self.failure_cooldown,
            success_cooldown: self.success_cooldown,
        })
    }
}

impl<H: Eq + Hash> Default for DropOnSustainedFailureBuilder<H> {
    fn default() -> Self {
        Self::new()
    }
}
