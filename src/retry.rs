//! Retry controller
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries) and is coerced to at least 1.
//! - After each attempt the `should_retry` predicate sees the request and that attempt's
//!   outcome. If it declines, or the budget is spent, the outcome is returned unchanged; the
//!   controller never synthesizes an error of its own.
//! - Otherwise the controller sleeps `backoff.delay(i, request, response)` (with jitter, `None`
//!   by default) where `i` is the 0-based index of the attempt that just failed. No sleep
//!   follows the final attempt.
//! - If the inner service fails readiness before a retry, the previous attempt's outcome is
//!   returned instead of the readiness error.
//! - Each attempt sends a fresh copy of the request. Requests with streaming bodies cannot be
//!   copied and are sent exactly once.
//!
//! Invariants:
//! - Attempts never exceed `max_attempts`.
//! - For N attempts there are exactly N-1 sleeps.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use outbound::{retry_on_server_error, Backoff, RetryLayer};
//!
//! let layer = RetryLayer::builder()
//!     .max_attempts(4)
//!     .backoff(Backoff::linear(Duration::from_millis(200)))
//!     .should_retry(retry_on_server_error())
//!     .build();
//! # let _ = layer;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

use crate::backoff::{Backoff, BackoffStrategy};
use crate::predicate::{retry_on_error, ResultPredicate};
use crate::telemetry::{emit_best_effort, NullSink, PipelineEvent, RetryEvent, TelemetrySink};
use crate::{Error, Jitter, Request, Response, Sleeper, TokioSleeper};

struct RetryConfig {
    max_attempts: usize,
    backoff: Arc<dyn BackoffStrategy>,
    jitter: Jitter,
    should_retry: ResultPredicate,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("sleeper", &self.sleeper)
            .field("should_retry", &"<predicate>")
            .finish()
    }
}

/// Tower layer that re-sends failed requests.
#[derive(Clone, Debug)]
pub struct RetryLayer<K = NullSink> {
    config: Arc<RetryConfig>,
    sink: K,
}

impl RetryLayer {
    pub fn builder() -> RetryLayerBuilder {
        RetryLayerBuilder::new()
    }
}

impl<K> RetryLayer<K> {
    /// Total attempts per request, after coercion.
    pub fn max_attempts(&self) -> usize {
        self.config.max_attempts
    }
}

impl<S, K: Clone> Layer<S> for RetryLayer<K> {
    type Service = RetryService<S, K>;

    fn layer(&self, service: S) -> Self::Service {
        RetryService { inner: service, config: self.config.clone(), sink: self.sink.clone() }
    }
}

/// Retry service produced by [`RetryLayer`].
#[derive(Clone, Debug)]
pub struct RetryService<S, K = NullSink> {
    inner: S,
    config: Arc<RetryConfig>,
    sink: K,
}

impl<S, K> Service<Request> for RetryService<S, K>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send + 'static,
    K: TelemetrySink,
    K::Future: Send + 'static,
{
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response, Error>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let config = self.config.clone();
        let sink = self.sink.clone();

        Box::pin(async move {
            let mut attempt = 0;
            let mut previous: Option<Result<Response, Error>> = None;
            loop {
                let Some(copy) = req.try_clone() else {
                    if config.max_attempts > 1 {
                        tracing::warn!(
                            method = %req.method(),
                            url = %req.url(),
                            "request body cannot be replayed, sending once without retries"
                        );
                    }
                    return inner.call(req).await;
                };
                if let Some(last) = previous.take() {
                    if let Err(err) = inner.ready().await {
                        tracing::debug!(
                            attempt,
                            error = %err,
                            "inner service not ready, keeping last outcome"
                        );
                        return last;
                    }
                }
                let outcome = inner.call(copy).await;

                if !(config.should_retry)(&req, outcome.as_ref()) {
                    return outcome;
                }
                if attempt + 1 >= config.max_attempts {
                    tracing::debug!(attempts = config.max_attempts, "retry budget exhausted");
                    emit_best_effort(
                        sink.clone(),
                        PipelineEvent::Retry(RetryEvent::Exhausted {
                            attempts: config.max_attempts,
                        }),
                    )
                    .await;
                    return outcome;
                }

                let delay = config.backoff.delay(attempt, &req, outcome.as_ref().ok());
                let delay = config.jitter.apply(delay);
                match &outcome {
                    Ok(response) => {
                        tracing::debug!(attempt, ?delay, status = %response.status(), "retrying")
                    }
                    Err(err) => tracing::debug!(attempt, ?delay, error = %err, "retrying"),
                }
                previous = Some(outcome);
                emit_best_effort(
                    sink.clone(),
                    PipelineEvent::Retry(RetryEvent::Attempt { attempt, delay }),
                )
                .await;
                config.sleeper.sleep(delay).await;
                attempt += 1;
            }
        })
    }
}

/// Builder for [`RetryLayer`].
pub struct RetryLayerBuilder<K = NullSink> {
    max_attempts: usize,
    backoff: Arc<dyn BackoffStrategy>,
    jitter: Jitter,
    should_retry: ResultPredicate,
    sleeper: Arc<dyn Sleeper>,
    sink: K,
}

impl RetryLayerBuilder {
    /// Three attempts, constant one second backoff, retry on transport errors only.
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff: Arc::new(Backoff::constant(Duration::from_secs(1))),
            jitter: Jitter::None,
            should_retry: Arc::new(retry_on_error()),
            sleeper: Arc::new(TokioSleeper),
            sink: NullSink,
        }
    }
}

impl Default for RetryLayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> RetryLayerBuilder<K> {
    /// Set total attempts (initial + retries). Values below 1 become 1.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn backoff<B>(mut self, backoff: B) -> Self
    where
        B: BackoffStrategy + 'static,
    {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Decide, per attempt, whether to try again.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request, Result<&Response, &Error>) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn sink<K2: TelemetrySink>(self, sink: K2) -> RetryLayerBuilder<K2> {
        RetryLayerBuilder {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            should_retry: self.should_retry,
            sleeper: self.sleeper,
            sink,
        }
    }

    pub fn build(self) -> RetryLayer<K> {
        let config = RetryConfig {
            max_attempts: self.max_attempts.max(1),
            backoff: self.backoff,
            jitter: self.jitter,
            should_retry: self.should_retry,
            sleeper: self.sleeper,
        };
        RetryLayer { config: Arc::new(config), sink: self.sink }
    }
}
