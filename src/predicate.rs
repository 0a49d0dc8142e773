//! Outcome predicates shared by the retry controller and failure-aware recorders.
//!
//! A predicate sees the request and the outcome of one attempt and answers a yes/no question:
//! "should this be retried?" for [`RetryLayer`](crate::RetryLayer), "was this a failure?" for
//! [`DropOnSustainedFailure`](crate::pool::DropOnSustainedFailure).

use std::sync::Arc;

use reqwest::StatusCode;

use crate::{Error, Request, Response};

/// Predicate over one attempt's outcome, as stored by the layers.
pub type ResultPredicate =
    Arc<dyn Fn(&Request, Result<&Response, &Error>) -> bool + Send + Sync>;

/// True exactly when no response was received. HTTP status is ignored.
pub fn retry_on_error(
) -> impl Fn(&Request, Result<&Response, &Error>) -> bool + Clone + Send + Sync + 'static {
    |_: &Request, outcome: Result<&Response, &Error>| outcome.is_err()
}

/// True on a transport error or a 5xx response.
pub fn retry_on_server_error(
) -> impl Fn(&Request, Result<&Response, &Error>) -> bool + Clone + Send + Sync + 'static {
    |_: &Request, outcome: Result<&Response, &Error>| match outcome {
        Ok(response) => response.status().is_server_error(),
        Err(_) => true,
    }
}

/// True on a transport error or when the response status is one of `statuses`.
pub fn retry_on_status(
    statuses: &[StatusCode],
) -> impl Fn(&Request, Result<&Response, &Error>) -> bool + Clone + Send + Sync + 'static {
    let statuses = statuses.to_vec();
    move |_: &Request, outcome: Result<&Response, &Error>| match outcome {
        Ok(response) => statuses.contains(&response.status()),
        Err(_) => true,
    }
}
