//! Scripted in-memory transport shared by the engine tests.
//!
//! Responses are replayed in the order they were queued. Every request the
//! engines issue is recorded so tests can assert on headers and bodies.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use notaku_core::types::User;
use notaku_core::{
    ApiClient, ClientConfig, HttpRequest, HttpResponse, ProgressSink, StreamingResponse,
    TokenStore, Transport, TransportCapabilities, TransportError,
};

pub const BASE_URL: &str = "http://api.test";
pub const INTEGRATION_URL: &str = "http://ocr.test";

pub enum Scripted {
    Response(HttpResponse),
    /// Body delivered as separate chunks, optionally ending in a read error.
    Chunks {
        status: u16,
        chunks: Vec<Bytes>,
        error: Option<TransportError>,
    },
    Fail(TransportError),
    /// Never settles; only cancellation ends the call.
    Hang,
}

pub struct MockTransport {
    capabilities: TransportCapabilities,
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
    progress_step: usize,
}

impl MockTransport {
    pub fn new(capabilities: TransportCapabilities) -> Arc<Self> {
        Self::with_progress_step(capabilities, 64 * 1024)
    }

    pub fn with_progress_step(capabilities: TransportCapabilities, step: usize) -> Arc<Self> {
        Arc::new(Self {
            capabilities,
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            progress_step: step,
        })
    }

    pub fn push(&self, scripted: Scripted) {
        self.script.lock().unwrap().push_back(scripted);
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        self.push(Scripted::Response(HttpResponse::json(status, &body)));
    }

    pub fn push_chunks(&self, status: u16, chunks: &[&[u8]]) {
        self.push(Scripted::Chunks {
            status,
            chunks: chunks.iter().map(|c| Bytes::copy_from_slice(c)).collect(),
            error: None,
        });
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests().pop().expect("no request was issued")
    }

    async fn next(&self, request: HttpRequest) -> Scripted {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Hang) => futures::future::pending().await,
            Some(scripted) => scripted,
            None => panic!("no scripted response left"),
        }
    }
}

fn buffered(scripted: Scripted) -> Result<HttpResponse, TransportError> {
    match scripted {
        Scripted::Response(response) => Ok(response),
        Scripted::Chunks {
            error: Some(e), ..
        } => Err(e),
        Scripted::Chunks { status, chunks, .. } => {
            Ok(HttpResponse::new(status, chunks.concat()).with_header("content-type", "text/plain"))
        }
        Scripted::Fail(e) => Err(e),
        Scripted::Hang => unreachable!(),
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn capabilities(&self) -> TransportCapabilities {
        self.capabilities
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        buffered(self.next(request).await)
    }

    async fn send_with_progress(
        &self,
        request: HttpRequest,
        progress: ProgressSink,
    ) -> Result<HttpResponse, TransportError> {
        let total = request.body.as_ref().map_or(0, |b| b.len()) as u64;
        let scripted = self.next(request).await;
        if matches!(scripted, Scripted::Fail(_)) {
            return buffered(scripted);
        }
        let mut loaded = 0u64;
        while loaded < total {
            loaded = (loaded + self.progress_step as u64).min(total);
            progress(loaded, total);
        }
        buffered(scripted)
    }

    async fn send_streaming(&self, request: HttpRequest) -> Result<StreamingResponse, TransportError> {
        match self.next(request).await {
            Scripted::Chunks {
                status,
                chunks,
                error,
            } => {
                let items = chunks
                    .into_iter()
                    .map(Ok)
                    .chain(error.into_iter().map(Err))
                    .collect::<Vec<_>>();
                Ok(StreamingResponse {
                    status,
                    status_text: String::new(),
                    headers: vec![("content-type".into(), "text/plain".into())],
                    body: stream::iter(items).boxed(),
                })
            }
            Scripted::Response(response) => Ok(StreamingResponse {
                status: response.status,
                status_text: response.status_text,
                headers: response.headers,
                body: stream::iter(vec![Ok(response.body)]).boxed(),
            }),
            Scripted::Fail(e) => Err(e),
            Scripted::Hang => unreachable!(),
        }
    }
}

pub fn config() -> ClientConfig {
    ClientConfig {
        integration_base_url: INTEGRATION_URL.into(),
        ..ClientConfig::with_base_url(BASE_URL)
    }
}

pub fn client_with(transport: Arc<MockTransport>) -> ApiClient {
    ApiClient::new(config(), transport, TokenStore::in_memory())
}

pub fn alice() -> User {
    User {
        id: "u-alice".into(),
        email: "alice@example.com".into(),
        name: Some("Alice".into()),
        tier: "pro".into(),
    }
}
