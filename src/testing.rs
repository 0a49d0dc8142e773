//! Fixtures shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::{Body, Method, Url};

use crate::error::BoxError;
use crate::transport::Transport;
use crate::{Request, Response};

pub(crate) fn get(url: &str) -> Request {
    Request::new(Method::GET, Url::parse(url).expect("valid url"))
}

/// A POST whose body is a one-shot stream, so `try_clone` returns `None`.
pub(crate) fn streaming_post(url: &str) -> Request {
    let mut req = Request::new(Method::POST, Url::parse(url).expect("valid url"));
    let chunks = futures::stream::iter(vec![Ok::<_, std::io::Error>("chunk")]);
    *req.body_mut() = Some(Body::wrap_stream(chunks));
    req
}

pub(crate) fn response(status: u16) -> Response {
    let inner = http::Response::builder().status(status).body("").expect("valid response");
    Response::from(inner)
}

/// Transport that answers every request with a fixed status, or fails when `status` is `None`.
#[derive(Debug)]
pub(crate) struct FixedTransport {
    status: Option<u16>,
    calls: AtomicUsize,
}

impl FixedTransport {
    pub(crate) fn ok(status: u16) -> Self {
        Self { status: Some(status), calls: AtomicUsize::new(0) }
    }

    pub(crate) fn failing() -> Self {
        Self { status: None, calls: AtomicUsize::new(0) }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FixedTransport {
    async fn send(&self, _request: Request) -> Result<Response, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.status {
            Some(status) => Ok(response(status)),
            None => Err("connection refused".into()),
        }
    }
}
