//! Backoff strategies for retry policies.
//!
//! Provides constant, linear, and quadratic strategies with optional caps. Attempt semantics:
//! the attempt index is the 0-based index of the attempt that just failed, so the delay before
//! the second attempt is `delay(0)`. Linear and quadratic curves therefore retry immediately
//! once before they start to grow.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use outbound::Backoff;
//!
//! let backoff = Backoff::quadratic(Duration::from_millis(100))
//!     .with_max(Duration::from_secs(2))
//!     .unwrap();
//! assert_eq!(backoff.delay_for(0), Duration::ZERO);
//! assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay_for(3), Duration::from_millis(900));
//! assert_eq!(backoff.delay_for(5), Duration::from_secs(2)); // capped
//! ```
//!
//! Overflow behavior: computations that would overflow saturate to `MAX_BACKOFF` (1 day).

use std::fmt;
use std::time::Duration;

use crate::{Request, Response};

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffError {
    ConstantDoesNotSupportMax,
    MaxMustBePositive,
    MaxLessThanUnit { unit: Duration, max: Duration },
}

impl fmt::Display for BackoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::ConstantDoesNotSupportMax => {
                write!(f, "with_max is only valid for Linear or Quadratic backoff")
            }
            BackoffError::MaxMustBePositive => write!(f, "max must be greater than zero"),
            BackoffError::MaxLessThanUnit { unit, max } => {
                write!(f, "max ({:?}) must be >= unit ({:?})", max, unit)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

/// Maps a failed attempt to the wait before the next one.
///
/// The request and the response of the failed attempt (if any) are provided for strategies that
/// need them, e.g. to honour a `Retry-After` header. The built-in strategies ignore both.
pub trait BackoffStrategy: Send + Sync + fmt::Debug {
    fn delay(&self, attempt: usize, request: &Request, response: Option<&Response>) -> Duration;
}

fn saturating_scale(unit: Duration, multiplier: u128) -> Duration {
    let nanos = unit.as_nanos().saturating_mul(multiplier);
    Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BackoffKind {
    Constant { delay: Duration },
    Linear { unit: Duration, max: Option<Duration> },
    Quadratic { unit: Duration, max: Option<Duration> },
}

/// Built-in backoff curves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    kind: BackoffKind,
}

impl Backoff {
    /// `f(i) = delay` for every attempt.
    pub fn constant(delay: Duration) -> Self {
        Self { kind: BackoffKind::Constant { delay } }
    }

    /// `f(i) = unit * i`
    pub fn linear(unit: Duration) -> Self {
        Self { kind: BackoffKind::Linear { unit, max: None } }
    }

    /// `f(i) = unit * i * i`
    ///
    /// Growth is polynomial in the attempt count, not exponential.
    pub fn quadratic(unit: Duration) -> Self {
        Self { kind: BackoffKind::Quadratic { unit, max: None } }
    }

    /// Set a maximum delay for the backoff (linear or quadratic).
    /// Returns an error if called on `Constant`, if `max` is zero, or if `max < unit`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        match &mut self.kind {
            BackoffKind::Linear { unit, max: existing }
            | BackoffKind::Quadratic { unit, max: existing } => {
                if max < *unit {
                    return Err(BackoffError::MaxLessThanUnit { unit: *unit, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            BackoffKind::Constant { .. } => Err(BackoffError::ConstantDoesNotSupportMax),
        }
    }

    /// Delay after the failed attempt with 0-based index `attempt`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let attempt = attempt as u128;
        let (raw, max) = match &self.kind {
            BackoffKind::Constant { delay } => return (*delay).min(MAX_BACKOFF),
            BackoffKind::Linear { unit, max } => (saturating_scale(*unit, attempt), max),
            BackoffKind::Quadratic { unit, max } => {
                (saturating_scale(*unit, attempt.saturating_mul(attempt)), max)
            }
        };
        max.map(|m| raw.min(m)).unwrap_or(raw)
    }
}

impl BackoffStrategy for Backoff {
    fn delay(&self, attempt: usize, _request: &Request, _response: Option<&Response>) -> Duration {
        self.delay_for(attempt)
    }
}
