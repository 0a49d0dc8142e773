mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{get, ScriptedTransport, SharedWriter};
use outbound::pool::{AlwaysReturn, DropOnSustainedFailure, Handle, PoolDispatch, ResourcePool};
use outbound::{retry_on_server_error, Client};
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};

type Api = Handle<ScriptedTransport>;

#[tokio::test(start_paused = true)]
async fn acquire_blocks_until_another_task_adds() {
    let pool: ResourcePool<Api> = ResourcePool::new();
    let added = Handle::new(ScriptedTransport::always("late", 200));

    let adder = tokio::spawn({
        let pool = pool.clone();
        let added = added.clone();
        async move {
            sleep(Duration::from_secs(3)).await;
            pool.add([added]);
        }
    });

    let start = Instant::now();
    let got = pool.acquire().await;

    assert_eq!(got, added);
    assert_eq!(start.elapsed(), Duration::from_secs(3));
    adder.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_handle_is_served_to_two_callers() {
    let pool: ResourcePool<Api> = ResourcePool::new();
    let handles: Vec<Api> =
        (0..8).map(|_| Handle::new(ScriptedTransport::always("api", 200))).collect();

    let mut acquirers = JoinSet::new();
    for _ in 0..8 {
        let pool = pool.clone();
        acquirers.spawn(async move { pool.acquire().await });
    }
    pool.add(handles.iter().cloned());

    let mut served = HashSet::new();
    while let Some(handle) = acquirers.join_next().await {
        assert!(served.insert(handle.unwrap()));
    }
    assert_eq!(served, handles.into_iter().collect());
}

#[tokio::test(start_paused = true)]
async fn single_failure_withdraws_handle_with_threshold_one() {
    let writer = SharedWriter::default();
    let _guard = tracing::subscriber::set_default(writer.subscriber());

    let pool = ResourcePool::new();
    let flaky = Handle::new(ScriptedTransport::down("flaky"));
    pool.add([flaky.clone()]);
    let recorder = DropOnSustainedFailure::builder()
        .failure_threshold(1)
        .failure_cooldown(Duration::from_secs(1))
        .success_cooldown(Duration::from_secs(1))
        .build()
        .unwrap();
    let client = Client::builder().requester(PoolDispatch::new(pool.clone(), recorder)).build();

    let err = client.execute(get("http://api.test/")).await.unwrap_err();
    assert!(err.is_dispatch());
    assert!(err.to_string().contains("flaky refused the connection"));

    sleep(Duration::from_secs(3600)).await;
    assert!(pool.is_empty());
    assert_eq!(pool.pending_returns(), 0);
    assert!(writer.contents().contains("withdrawing pooled handle after sustained failures"));
}

#[tokio::test(start_paused = true)]
async fn recovering_handle_survives_below_threshold() {
    let pool = ResourcePool::new();
    let api = Handle::new(ScriptedTransport::new("api", [None, None, Some(200), None]));
    pool.add([api.clone()]);
    let recorder = DropOnSustainedFailure::builder()
        .failure_threshold(3)
        .failure_cooldown(Duration::from_secs(5))
        .build()
        .unwrap();
    let dispatch = PoolDispatch::new(pool.clone(), recorder);
    let client = Client::builder().requester(dispatch.clone()).build();

    for _ in 0..2 {
        assert!(client.execute(get("http://api.test/")).await.is_err());
    }
    assert_eq!(dispatch.recorder().failures(&api), 2);

    let start = Instant::now();
    let resp = client.execute(get("http://api.test/")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert_eq!(dispatch.recorder().failures(&api), 0);

    assert!(client.execute(get("http://api.test/")).await.is_err());
    assert_eq!(dispatch.recorder().failures(&api), 1);
    assert_eq!(pool.pending_returns(), 1);
}

#[tokio::test(start_paused = true)]
async fn status_based_failures_rotate_to_healthy_handles() {
    let pool = ResourcePool::new();
    let broken = Handle::new(ScriptedTransport::always("broken", 503));
    let healthy = Handle::new(ScriptedTransport::always("healthy", 200));
    pool.add([broken.clone(), healthy.clone()]);
    let recorder = DropOnSustainedFailure::builder()
        .is_failure(retry_on_server_error())
        .failure_threshold(2)
        .build()
        .unwrap();
    let client = Client::builder().requester(PoolDispatch::new(pool.clone(), recorder)).build();

    let mut statuses = Vec::new();
    for _ in 0..6 {
        statuses.push(client.execute(get("http://api.test/")).await.unwrap().status().as_u16());
    }

    // broken serves twice (503 responses pass through), then is withdrawn
    assert_eq!(broken.calls(), 2);
    assert_eq!(healthy.calls(), 4);
    assert_eq!(statuses.iter().filter(|s| **s == 503).count(), 2);
    assert_eq!(pool.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_cooldowns() {
    let pool = ResourcePool::new();
    pool.add([Handle::new(ScriptedTransport::always("api", 200))]);
    let client = Client::builder()
        .requester(PoolDispatch::new(pool.clone(), AlwaysReturn::new(Duration::from_secs(60))))
        .build();

    client.execute(get("http://api.test/")).await.unwrap();
    assert_eq!(pool.pending_returns(), 1);

    assert_eq!(pool.shutdown(), 1);
    sleep(Duration::from_secs(120)).await;
    assert!(pool.is_empty());
}
