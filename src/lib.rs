#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # outbound
//!
//! Outbound HTTP dispatch for async Rust: every request passes through a chain of wrappers
//! before it reaches a terminal call.
//!
//! ## Features
//!
//! - **Sliding-window admission** (`RateLimitLayer`): at most `capacity` requests per
//!   `interval`, where each request holds its slot until `interval` after it completes
//! - **Retry** (`RetryLayer`) with constant, linear, or quadratic backoff and pluggable
//!   stop predicates
//! - **Failure-aware client pool** (`pool::PoolDispatch`) that cools handles down between calls
//!   and withdraws the ones that keep failing
//! - **Composition** via tower `Layer`s or type-erased `Middleware`s
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use outbound::{Backoff, Client, RateLimitLayer, RetryLayer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::builder()
//!     .layer(RateLimitLayer::new(5, Duration::from_secs(60))?)
//!     .layer(
//!         RetryLayer::builder()
//!             .max_attempts(3)
//!             .backoff(Backoff::linear(Duration::from_millis(250)))
//!             .build(),
//!     )
//!     .build();
//!
//! let request = reqwest::Request::new(
//!     reqwest::Method::GET,
//!     "https://example.com/".parse()?,
//! );
//! let response = client.execute(request).await?;
//! println!("{}", response.status());
//! # Ok(()) }
//! ```

pub mod backoff;
pub mod client;
pub mod clock;
pub mod error;
pub mod jitter;
pub mod pool;
pub mod predicate;
pub mod prelude;
pub mod rate_limit;
pub mod retry;
pub mod sleeper;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-exports
pub use backoff::{Backoff, BackoffError, BackoffStrategy, MAX_BACKOFF};
pub use client::{Client, ClientBuilder, Middleware, Requester};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BoxError, BuildError, Error, QueueFull};
pub use jitter::Jitter;
pub use predicate::{retry_on_error, retry_on_server_error, retry_on_status, ResultPredicate};
pub use rate_limit::{AdmissionQueue, RateLimitLayer, RateLimitService, SharedQueue};
pub use reqwest::{Request, Response};
pub use retry::{RetryLayer, RetryLayerBuilder, RetryService};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use transport::{Transport, TransportService};
