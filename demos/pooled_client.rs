//! A full pipeline against an in-process upstream: admission window, retries, and a pool of
//! three clients, one of which is broken and gets withdrawn.
//!
//! Every pipeline event is logged through `LogSink`.

use async_trait::async_trait;
use outbound::prelude::*;
use outbound::telemetry::LogSink;
use outbound::BoxError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug)]
struct Upstream {
    name: &'static str,
    healthy: bool,
    served: AtomicUsize,
}

impl Upstream {
    fn new(name: &'static str, healthy: bool) -> Self {
        Self { name, healthy, served: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Transport for Upstream {
    async fn send(&self, request: Request) -> Result<Response, BoxError> {
        self.served.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if !self.healthy {
            return Err(format!("{}: connection reset", self.name).into());
        }
        let body = format!("{} served {}", self.name, request.url().path());
        Ok(Response::from(http::Response::new(body)))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let pool = ResourcePool::new();
    let upstreams: Vec<_> = [("alpha", true), ("bravo", false), ("charlie", true)]
        .into_iter()
        .map(|(name, healthy)| Handle::new(Upstream::new(name, healthy)))
        .collect();
    pool.add(upstreams.iter().cloned());

    let recorder = DropOnSustainedFailure::builder()
        .failure_threshold(2)
        .failure_cooldown(Duration::from_millis(200))
        .success_cooldown(Duration::from_millis(50))
        .build()?;

    let client = Client::builder()
        .layer(
            RateLimitLayer::builder()
                .capacity(4)
                .interval(Duration::from_secs(1))
                .granularity(Duration::from_millis(100))
                .poll_interval(Duration::from_millis(100))
                .sink(LogSink)
                .build()?,
        )
        .layer(
            RetryLayer::builder()
                .max_attempts(3)
                .backoff(Backoff::linear(Duration::from_millis(50)))
                .jitter(Jitter::equal())
                .sink(LogSink)
                .build(),
        )
        .requester(PoolDispatch::new(pool.clone(), recorder).with_sink(LogSink))
        .build();

    let mut calls = tokio::task::JoinSet::new();
    for n in 0..10 {
        let url = format!("http://upstream.local/items/{n}").parse()?;
        let request = Request::new(reqwest::Method::GET, url);
        calls.spawn(client.execute(request));
    }

    while let Some(result) = calls.join_next().await {
        match result? {
            Ok(response) => {
                let status = response.status();
                println!("{status} <- {}", response.text().await?);
            }
            Err(err) => println!("failed: {err}"),
        }
    }

    for upstream in &upstreams {
        println!("{} handled {} attempts", upstream.name, upstream.served.load(Ordering::Relaxed));
    }
    println!("handles left in pool: {}", pool.len());
    pool.shutdown();
    Ok(())
}
