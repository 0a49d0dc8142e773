use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use tower_layer::Layer;
use tower_service::Service;

use crate::clock::{Clock, SystemClock};
use crate::error::BuildError;
use crate::rate_limit::queue::{AdmissionQueue, Ticket};
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::telemetry::{emit_best_effort, AdmissionEvent, NullSink, PipelineEvent, TelemetrySink};

/// Admission queue shared by every service produced from one layer.
pub type SharedQueue = Arc<Mutex<AdmissionQueue>>;

/// Timestamps are truncated to this window so near-simultaneous reservations coalesce.
pub const DEFAULT_GRANULARITY: Duration = Duration::from_secs(1);
/// Pause between admission attempts while the queue is full.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug)]
struct Limiter {
    queue: SharedQueue,
    interval_ms: u64,
    granularity_ms: u64,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl Limiter {
    fn lock(&self) -> MutexGuard<'_, AdmissionQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Expiry for a reservation that starts now.
    fn expiry(&self) -> u64 {
        let now = self.clock.now_millis();
        (now - now % self.granularity_ms).saturating_add(self.interval_ms)
    }

    /// Reclaim expired slots, then try to reserve one.
    fn try_admit(&self) -> Result<(Ticket, usize), (usize, usize)> {
        let candidate = self.expiry();
        let now = self.clock.now_millis();
        let mut queue = self.lock();
        while queue.peek_at(0).is_some_and(|expires_at| expires_at < now) {
            queue.dequeue();
        }
        match queue.enqueue(candidate) {
            Ok(ticket) => Ok((ticket, queue.len())),
            Err(full) => Err((queue.len(), full.capacity)),
        }
    }

    async fn admit<K>(self: &Arc<Self>, sink: &K) -> Reservation
    where
        K: TelemetrySink,
        K::Future: Send + 'static,
    {
        let mut waited = Duration::ZERO;
        let mut throttled = false;
        loop {
            match self.try_admit() {
                Ok((ticket, occupancy)) => {
                    tracing::trace!(occupancy, ?waited, "admitted");
                    emit_best_effort(
                        sink.clone(),
                        PipelineEvent::Admission(AdmissionEvent::Admitted { waited, occupancy }),
                    )
                    .await;
                    return Reservation { limiter: self.clone(), ticket };
                }
                Err((occupancy, capacity)) => {
                    if !throttled {
                        throttled = true;
                        tracing::debug!(occupancy, capacity, "admission window full, waiting");
                        emit_best_effort(
                            sink.clone(),
                            PipelineEvent::Admission(AdmissionEvent::Throttled {
                                occupancy,
                                capacity,
                            }),
                        )
                        .await;
                    }
                    self.sleeper.sleep(self.poll_interval).await;
                    waited += self.poll_interval;
                }
            }
        }
    }
}

/// A held admission slot. Dropping it restarts the slot's cooldown from the current time, so
/// a slow call keeps its reservation until `interval` after it finishes.
struct Reservation {
    limiter: Arc<Limiter>,
    ticket: Ticket,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let expires_at = self.limiter.expiry();
        self.limiter.lock().update(self.ticket, expires_at);
    }
}

/// A layer that admits at most `capacity` requests per sliding `interval`.
///
/// Each request holds one slot from admission until `interval` after it completes. When every
/// slot is taken the request waits (polling every `poll_interval`) rather than failing, so
/// the limiter is pure backpressure: it never produces an error of its own.
#[derive(Clone, Debug)]
pub struct RateLimitLayer<K = NullSink> {
    limiter: Arc<Limiter>,
    sink: K,
}

impl RateLimitLayer {
    /// Layer with its own queue of `capacity` slots.
    pub fn new(capacity: usize, interval: Duration) -> Result<Self, BuildError> {
        Self::builder().capacity(capacity).interval(interval).build()
    }

    pub fn builder() -> RateLimitLayerBuilder {
        RateLimitLayerBuilder::new()
    }
}

impl<K> RateLimitLayer<K> {
    /// The admission queue backing this layer.
    pub fn queue(&self) -> SharedQueue {
        self.limiter.queue.clone()
    }
}

impl<S, K> Layer<S> for RateLimitLayer<K>
where
    K: Clone,
{
    type Service = RateLimitService<S, K>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService { inner: service, limiter: self.limiter.clone(), sink: self.sink.clone() }
    }
}

/// Middleware service that enforces the admission window.
#[derive(Clone, Debug)]
pub struct RateLimitService<S, K = NullSink> {
    inner: S,
    limiter: Arc<Limiter>,
    sink: K,
}

impl<S, K, Req> Service<Req> for RateLimitService<S, K>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    K: TelemetrySink,
    K::Future: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        // keep the service that was driven to readiness
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let limiter = self.limiter.clone();
        let sink = self.sink.clone();

        Box::pin(async move {
            let _reservation = limiter.admit(&sink).await;
            inner.call(req).await
        })
    }
}

/// Builder for [`RateLimitLayer`].
pub struct RateLimitLayerBuilder<K = NullSink> {
    queue: Option<SharedQueue>,
    capacity: usize,
    interval: Duration,
    granularity: Duration,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    sink: K,
}

impl RateLimitLayerBuilder {
    pub fn new() -> Self {
        Self {
            queue: None,
            capacity: 1,
            interval: Duration::from_secs(1),
            granularity: DEFAULT_GRANULARITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            sink: NullSink,
        }
    }
}

impl Default for RateLimitLayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> RateLimitLayerBuilder<K> {
    /// Number of slots in a freshly created queue. Ignored when [`queue`](Self::queue) is set.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Share an existing queue, e.g. between several clients talking to one host.
    pub fn queue(mut self, queue: SharedQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// How long a slot stays taken after its request completes.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Truncation unit for reservation timestamps. Must be > 0.
    pub fn granularity(mut self, granularity: Duration) -> Self {
        self.granularity = granularity;
        self
    }

    /// Pause between admission attempts while the queue is full.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn sink<K2: TelemetrySink>(self, sink: K2) -> RateLimitLayerBuilder<K2> {
        RateLimitLayerBuilder {
            queue: self.queue,
            capacity: self.capacity,
            interval: self.interval,
            granularity: self.granularity,
            poll_interval: self.poll_interval,
            clock: self.clock,
            sleeper: self.sleeper,
            sink,
        }
    }

    pub fn build(self) -> Result<RateLimitLayer<K>, BuildError> {
        let granularity_ms = millis(self.granularity);
        if granularity_ms == 0 {
            return Err(BuildError::ZeroGranularity(self.granularity));
        }
        let queue = match self.queue {
            Some(queue) => queue,
            None => Arc::new(Mutex::new(AdmissionQueue::new(self.capacity))),
        };
        if queue.lock().unwrap_or_else(PoisonError::into_inner).capacity() == 0 {
            return Err(BuildError::ZeroCapacity);
        }
        let limiter = Limiter {
            queue,
            interval_ms: millis(self.interval),
            granularity_ms,
            poll_interval: self.poll_interval,
            clock: self.clock,
            sleeper: self.sleeper,
        };
        Ok(RateLimitLayer { limiter: Arc::new(limiter), sink: self.sink })
    }
}
