//! Terminal calls: the thing every pipeline ultimately invokes.

use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::future::BoxFuture;
use tower_service::Service;

use crate::error::BoxError;
use crate::{Error, Request, Response};

/// Something that can perform an HTTP request.
///
/// Implemented for [`reqwest::Client`]; pooled handles forward to the client they wrap.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `request` and wait for the response head.
    async fn send(&self, request: Request) -> Result<Response, BoxError>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn send(&self, request: Request) -> Result<Response, BoxError> {
        Ok(self.execute(request).await?)
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request) -> Result<Response, BoxError> {
        (**self).send(request).await
    }
}

/// Terminal service over a single transport.
#[derive(Debug)]
pub struct TransportService<T> {
    transport: Arc<T>,
}

impl<T> TransportService<T> {
    pub fn new(transport: T) -> Self {
        Self { transport: Arc::new(transport) }
    }

    pub fn from_arc(transport: Arc<T>) -> Self {
        Self { transport }
    }

    pub fn get_ref(&self) -> &T {
        &self.transport
    }
}

impl<T> Clone for TransportService<T> {
    fn clone(&self) -> Self {
        Self { transport: self.transport.clone() }
    }
}

impl<T: Transport> Service<Request> for TransportService<T> {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response, Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let transport = self.transport.clone();
        Box::pin(async move { transport.send(request).await.map_err(Error::Transport) })
    }
}

/// Copy of `request` for inspection after it has been sent.
///
/// Falls back to a body-less copy when the body is a stream.
pub(crate) fn snapshot(request: &Request) -> Request {
    request.try_clone().unwrap_or_else(|| {
        let mut copy = Request::new(request.method().clone(), request.url().clone());
        *copy.headers_mut() = request.headers().clone();
        *copy.version_mut() = request.version();
        *copy.timeout_mut() = request.timeout().copied();
        copy
    })
}
