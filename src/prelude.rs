//! Convenient re-exports for assembling a pipeline.
pub use crate::{
    backoff::{Backoff, BackoffStrategy},
    client::{Client, Middleware, Requester},
    jitter::Jitter,
    pool::{AlwaysReturn, DropOnSustainedFailure, Handle, PoolDispatch, Recorder, ResourcePool},
    predicate::{retry_on_error, retry_on_server_error, retry_on_status},
    rate_limit::{RateLimitLayer, SharedQueue},
    retry::RetryLayer,
    transport::Transport,
    BuildError, Error, Request, Response,
};
