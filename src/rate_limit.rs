//! Sliding-window admission control.
//!
//! - [`AdmissionQueue`]: fixed ring of slot expiry timestamps.
//! - [`RateLimitLayer`]: tower middleware that reserves a slot before forwarding a request and
//!   releases it `interval` after the request completes.
//!
//! A queue can be shared between several layers through [`SharedQueue`], in which case all of
//! them draw from the same budget.

pub mod middleware;
pub mod queue;

pub use middleware::{
    RateLimitLayer, RateLimitLayerBuilder, RateLimitService, SharedQueue, DEFAULT_GRANULARITY,
    DEFAULT_POLL_INTERVAL,
};
pub use queue::{AdmissionQueue, Ticket};
