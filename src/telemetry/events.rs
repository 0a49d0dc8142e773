use std::fmt;
use std::time::Duration;

/// Events emitted while a request moves through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Rate limiter events
    Admission(AdmissionEvent),
    /// Retry controller events
    Retry(RetryEvent),
    /// Pool dispatch events
    Pool(PoolEvent),
}

/// Events emitted by the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionEvent {
    /// The admission window was full; the request is waiting for a slot.
    ///
    /// Emitted once per request, on the first rejected attempt.
    Throttled {
        /// Occupied slots when the request was turned away
        occupancy: usize,
        /// Queue capacity
        capacity: usize,
    },
    /// The request took a slot and is about to be forwarded.
    Admitted {
        /// Time spent waiting for a slot
        waited: Duration,
        /// Occupied slots after admission
        occupancy: usize,
    },
}

/// Events emitted by the retry controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    /// A retry is about to be made.
    ///
    /// Emitted before sleeping.
    Attempt {
        /// Index of the attempt that just failed (0-based)
        attempt: usize,
        /// The backoff delay before the next attempt
        delay: Duration,
    },
    /// The attempt budget ran out while the predicate still asked for a retry.
    Exhausted {
        /// Total number of attempts made
        attempts: usize,
    },
}

/// Events emitted by pool dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    /// A handle was taken from the pool.
    Acquired {
        /// Time spent waiting for a handle
        waited: Duration,
        /// Handles left in the pool
        remaining: usize,
    },
    /// The request finished and the recorder has run.
    Released {
        /// Whether the request failed at the transport level
        failed: bool,
    },
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::Admission(event) => write!(f, "Admission::{}", event),
            PipelineEvent::Retry(event) => write!(f, "Retry::{}", event),
            PipelineEvent::Pool(event) => write!(f, "Pool::{}", event),
        }
    }
}

impl fmt::Display for AdmissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionEvent::Throttled { occupancy, capacity } => {
                write!(f, "Throttled({}/{})", occupancy, capacity)
            }
            AdmissionEvent::Admitted { waited, occupancy } => {
                write!(f, "Admitted(waited={:?}, occupancy={})", waited, occupancy)
            }
        }
    }
}

impl fmt::Display for RetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryEvent::Attempt { attempt, delay } => {
                write!(f, "Attempt(#{}, delay={:?})", attempt, delay)
            }
            RetryEvent::Exhausted { attempts } => write!(f, "Exhausted(attempts={})", attempts),
        }
    }
}

impl fmt::Display for PoolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolEvent::Acquired { waited, remaining } => {
                write!(f, "Acquired(waited={:?}, remaining={})", waited, remaining)
            }
            PoolEvent::Released { failed } => write!(f, "Released(failed={})", failed),
        }
    }
}
