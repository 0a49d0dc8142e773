mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{get, ScriptedTransport, SharedWriter};
use outbound::pool::{DropOnSustainedFailure, Handle, PoolDispatch, ResourcePool};
use outbound::telemetry::{AdmissionEvent, MemorySink, PipelineEvent, RetryEvent};
use outbound::{
    Backoff, Client, ManualClock, RateLimitLayer, RetryLayer, TrackingSleeper,
};

fn clock_and_sleeper() -> (ManualClock, TrackingSleeper) {
    let clock = ManualClock::new(10_000);
    let sleeper = TrackingSleeper::advancing(clock.clone());
    (clock, sleeper)
}

#[tokio::test(start_paused = true)]
async fn retries_inside_the_limiter_share_one_slot() {
    let (clock, sleeper) = clock_and_sleeper();
    let limiter = RateLimitLayer::builder()
        .capacity(3)
        .interval(Duration::from_secs(60))
        .clock(clock.clone())
        .sleeper(sleeper.clone())
        .build()
        .unwrap();
    let queue = limiter.queue();
    let pool = ResourcePool::new();
    let down = Handle::new(ScriptedTransport::down("down"));
    let up = Handle::new(ScriptedTransport::always("up", 200));
    pool.add([down.clone(), up.clone()]);
    let recorder = DropOnSustainedFailure::builder().failure_threshold(1).build().unwrap();

    let client = Client::builder()
        .layer(limiter)
        .layer(
            RetryLayer::builder()
                .max_attempts(3)
                .backoff(Backoff::constant(Duration::from_millis(500)))
                .sleeper(sleeper.clone())
                .build(),
        )
        .requester(PoolDispatch::new(pool.clone(), recorder))
        .build();

    let resp = client.execute(get("http://api.test/")).await.unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!((down.calls(), up.calls()), (1, 1));
    assert_eq!(sleeper.calls(), vec![Duration::from_millis(500)]);
    assert_eq!(queue.lock().unwrap().len(), 1);
    assert_eq!(pool.len(), 1);
}

#[tokio::test]
async fn retries_outside_the_limiter_each_take_a_slot() {
    let (clock, sleeper) = clock_and_sleeper();
    let sink = MemorySink::new();
    let limiter = RateLimitLayer::builder()
        .capacity(3)
        .interval(Duration::from_secs(60))
        .clock(clock.clone())
        .sleeper(sleeper.clone())
        .sink(sink.clone())
        .build()
        .unwrap();
    let queue = limiter.queue();
    let transport = Arc::new(ScriptedTransport::new("api", [None, None, Some(200)]));

    let client = Client::builder()
        .layer(
            RetryLayer::builder()
                .max_attempts(5)
                .backoff(Backoff::constant(Duration::from_millis(100)))
                .sleeper(sleeper.clone())
                .sink(sink.clone())
                .build(),
        )
        .layer(limiter)
        .transport(transport.clone())
        .build();

    let resp = client.execute(get("http://api.test/")).await.unwrap();

    assert_eq!(resp.status(), 200);
    assert_eq!(transport.calls(), 3);
    assert_eq!(queue.lock().unwrap().len(), 3);

    let events = sink.events();
    let admitted = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::Admission(AdmissionEvent::Admitted { .. })))
        .count();
    let retried = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::Retry(RetryEvent::Attempt { .. })))
        .count();
    assert_eq!((admitted, retried), (3, 2));
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_response() {
    let sleeper = TrackingSleeper::new();
    let transport = Arc::new(ScriptedTransport::always("api", 503));
    let client = Client::builder()
        .layer(
            RetryLayer::builder()
                .max_attempts(4)
                .should_retry(outbound::retry_on_server_error())
                .backoff(Backoff::quadratic(Duration::from_millis(1)))
                .sleeper(sleeper.clone())
                .build(),
        )
        .transport(transport.clone())
        .build();

    let resp = client.execute(get("http://api.test/")).await.unwrap();

    assert_eq!(resp.status(), 503);
    assert_eq!(transport.calls(), 4);
    assert_eq!(
        sleeper.calls(),
        vec![Duration::ZERO, Duration::from_millis(1), Duration::from_millis(4)]
    );
}

#[tokio::test]
async fn streaming_bodies_are_not_replayed() {
    let writer = SharedWriter::default();
    let _guard = tracing::subscriber::set_default(writer.subscriber());

    let transport = Arc::new(ScriptedTransport::down("api"));
    let client = Client::builder()
        .layer(RetryLayer::builder().max_attempts(3).sleeper(TrackingSleeper::new()).build())
        .transport(transport.clone())
        .build();

    let mut request = get("http://api.test/upload");
    *request.method_mut() = reqwest::Method::PUT;
    let chunks = futures::stream::iter(vec![Ok::<_, std::io::Error>("part")]);
    *request.body_mut() = Some(reqwest::Body::wrap_stream(chunks));

    let err = client.execute(request).await.unwrap_err();

    assert!(err.is_transport());
    assert_eq!(transport.calls(), 1);
    assert!(writer.contents().contains("request body cannot be replayed"));
}
