#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use outbound::{BoxError, Request, Response, Transport};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

pub fn get(url: &str) -> Request {
    Request::new(reqwest::Method::GET, url.parse().expect("valid url"))
}

pub fn response(status: u16) -> Response {
    let inner = http::Response::builder().status(status).body("").expect("valid response");
    Response::from(inner)
}

/// Transport that plays back a script of outcomes, repeating the last one forever.
///
/// `Some(status)` answers with that status, `None` fails as if the connection was refused.
#[derive(Debug)]
pub struct ScriptedTransport {
    name: &'static str,
    script: Mutex<VecDeque<Option<u16>>>,
    last: Mutex<Option<u16>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(name: &'static str, script: impl IntoIterator<Item = Option<u16>>) -> Self {
        Self {
            name,
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(name: &'static str, status: u16) -> Self {
        Self::new(name, [Some(status)])
    }

    pub fn down(name: &'static str) -> Self {
        Self::new(name, [None])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, _request: Request) -> Result<Response, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            if let Some(step) = script.pop_front() {
                *last = step;
            }
            *last
        };
        match next {
            Some(status) => Ok(response(status)),
            None => Err(Box::new(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} refused the connection", self.name),
            ))),
        }
    }
}

/// Captures formatted `tracing` output in memory.
#[derive(Clone, Default)]
pub struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl SharedWriter {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(BoxMakeWriter::new(self.clone()))
            .with_max_level(tracing::Level::TRACE)
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .finish()
    }
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

pub struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
