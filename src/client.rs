//! Pipeline assembly.
//!
//! A [`Client`] is a terminal call wrapped in zero or more middlewares. Middlewares are applied
//! so that the first one added is the outermost: with `[rate_limit, retry]` every retry attempt
//! passes through nothing but the terminal, and the whole retry sequence holds one admission
//! slot.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::util::{BoxCloneService, Oneshot};
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

use crate::transport::{Transport, TransportService};
use crate::{Error, Request, Response};

/// Type-erased terminal (or already wrapped) call.
pub type Requester = BoxCloneService<Request, Response, Error>;

/// Type-erased wrapper: takes the next call in the chain and returns a new call.
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(Requester) -> Requester + Send + Sync>);

impl Middleware {
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(Requester) -> Requester + Send + Sync + 'static,
    {
        Self(Arc::new(wrap))
    }

    /// Erase a tower layer.
    pub fn from_layer<L>(layer: L) -> Self
    where
        L: Layer<Requester> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        Self::new(move |next| BoxCloneService::new(layer.layer(next)))
    }

    pub fn wrap(&self, next: Requester) -> Requester {
        (self.0)(next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware")
    }
}

/// Assembled request pipeline.
#[derive(Clone)]
pub struct Client {
    service: Requester,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Run `request` through the pipeline.
    pub fn execute(&self, request: Request) -> Oneshot<Requester, Request> {
        self.service.clone().oneshot(request)
    }

    /// The composed pipeline as a plain requester, e.g. to nest inside another client.
    pub fn into_requester(self) -> Requester {
        self.service
    }
}

impl Service<Request> for Client {
    type Response = Response;
    type Error = Error;
    type Future = <Requester as Service<Request>>::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        self.service.call(request)
    }
}

/// Builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    middlewares: Vec<Middleware>,
    terminal: Option<Requester>,
}

impl ClientBuilder {
    /// Append a tower layer. Earlier layers wrap later ones.
    pub fn layer<L>(self, layer: L) -> Self
    where
        L: Layer<Requester> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.middleware(Middleware::from_layer(layer))
    }

    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn middlewares<I>(mut self, middlewares: I) -> Self
    where
        I: IntoIterator<Item = Middleware>,
    {
        self.middlewares.extend(middlewares);
        self
    }

    /// Replace the terminal call.
    pub fn requester<S>(mut self, service: S) -> Self
    where
        S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        self.terminal = Some(BoxCloneService::new(service));
        self
    }

    /// Use a single transport as the terminal call.
    pub fn transport<T: Transport>(self, transport: T) -> Self {
        self.requester(TransportService::new(transport))
    }

    /// Compose the pipeline. Without a terminal, a default `reqwest::Client` is used.
    pub fn build(self) -> Client {
        let terminal = self
            .terminal
            .unwrap_or_else(|| BoxCloneService::new(TransportService::new(reqwest::Client::new())));
        let service = self.middlewares.iter().rev().fold(terminal, |next, middleware| {
            middleware.wrap(next)
        });
        Client { service }
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("middlewares", &self.middlewares.len())
            .field("custom_terminal", &self.terminal.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{get, response, FixedTransport};
    use std::sync::Mutex;
    use tower::service_fn;

    fn tagging(tag: &'static str, log: Arc<Mutex<Vec<&'static str>>>) -> Middleware {
        Middleware::new(move |next: Requester| {
            let log = log.clone();
            BoxCloneService::new(next.map_request(move |req: Request| {
                log.lock().unwrap().push(tag);
                req
            }))
        })
    }

    #[tokio::test]
    async fn first_middleware_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let terminal_log = log.clone();
        let client = Client::builder()
            .middleware(tagging("outer", log.clone()))
            .middlewares([tagging("middle", log.clone()), tagging("inner", log.clone())])
            .requester(service_fn(move |_req: Request| {
                terminal_log.lock().unwrap().push("terminal");
                async { Ok::<_, Error>(response(200)) }
            }))
            .build();

        client.execute(get("http://example.test/")).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["outer", "middle", "inner", "terminal"]);
    }

    #[tokio::test]
    async fn transport_terminal() {
        let client = Client::builder().transport(FixedTransport::ok(418)).build();

        let resp = client.execute(get("http://example.test/")).await.unwrap();

        assert_eq!(resp.status(), 418);
    }

    #[tokio::test]
    async fn client_is_a_service() {
        let client = Client::builder().transport(FixedTransport::failing()).build();

        let err = client.oneshot(get("http://example.test/")).await.unwrap_err();

        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn layers_are_erased_into_middlewares() {
        let client = Client::builder()
            .layer(tower::layer::layer_fn(|inner: Requester| inner))
            .transport(FixedTransport::ok(200))
            .build();

        assert_eq!(client.execute(get("http://example.test/")).await.unwrap().status(), 200);
    }
}
