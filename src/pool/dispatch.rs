use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tokio::time::Instant;
use tower_service::Service;

use crate::telemetry::{emit_best_effort, NullSink, PipelineEvent, PoolEvent, TelemetrySink};
use crate::transport::{snapshot, Transport};
use crate::{Error, Request, Response};

use super::recorder::Recorder;
use super::ResourcePool;

/// Terminal service that sends each request through a pooled handle.
///
/// Per call: acquire a handle (waiting if the pool is empty), send, hand the handle and the
/// outcome to the recorder, and surface the result. Transport failures come back as
/// [`Error::Dispatch`]; responses are returned untouched whatever their status.
///
/// If the call is cancelled before the transport finishes, the handle goes straight back to the
/// pool without consulting the recorder.
pub struct PoolDispatch<H, R, K = NullSink> {
    pool: ResourcePool<H>,
    recorder: Arc<R>,
    sink: K,
}

impl<H, R: Recorder<H>> PoolDispatch<H, R> {
    pub fn new(pool: ResourcePool<H>, recorder: R) -> Self {
        Self { pool, recorder: Arc::new(recorder), sink: NullSink }
    }
}

impl<H, R, K> PoolDispatch<H, R, K> {
    pub fn with_sink<K2: TelemetrySink>(self, sink: K2) -> PoolDispatch<H, R, K2> {
        PoolDispatch { pool: self.pool, recorder: self.recorder, sink }
    }

    pub fn pool(&self) -> &ResourcePool<H> {
        &self.pool
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }
}

impl<H, R, K: Clone> Clone for PoolDispatch<H, R, K> {
    fn clone(&self) -> Self {
        Self { pool: self.pool.clone(), recorder: self.recorder.clone(), sink: self.sink.clone() }
    }
}

impl<H, R, K> std::fmt::Debug for PoolDispatch<H, R, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolDispatch").field("pool", &self.pool).finish()
    }
}

/// Handle taken from the pool. Goes back on drop unless the recorder took it.
struct Checkout<H> {
    pool: ResourcePool<H>,
    handle: Option<H>,
}

impl<H> Drop for Checkout<H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.add([handle]);
        }
    }
}

impl<H, R, K> Service<Request> for PoolDispatch<H, R, K>
where
    H: Transport + Clone,
    R: Recorder<H>,
    K: TelemetrySink,
    K::Future: Send + 'static,
{
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response, Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let pool = self.pool.clone();
        let recorder = self.recorder.clone();
        let sink = self.sink.clone();

        Box::pin(async move {
            let started = Instant::now();
            let handle = pool.acquire().await;
            let waited = started.elapsed();
            let remaining = pool.len();
            tracing::trace!(?waited, remaining, "acquired pooled handle");
            emit_best_effort(
                sink.clone(),
                PipelineEvent::Pool(PoolEvent::Acquired { waited, remaining }),
            )
            .await;

            let mut checkout = Checkout { pool: pool.clone(), handle: Some(handle.clone()) };
            let sent = snapshot(&request);
            let outcome = handle.send(request).await.map_err(Error::Transport);

            checkout.handle = None;
            recorder.record(&pool, handle, &sent, outcome.as_ref());
            let failed = outcome.is_err();
            emit_best_effort(sink, PipelineEvent::Pool(PoolEvent::Released { failed })).await;

            outcome.map_err(|err| Error::Dispatch(err.into_source()))
        })
    }
}
