//! Transport port.
//!
//! One trait covers all three ways the engines talk to the network:
//! buffered request/response, upload with byte-level progress, and
//! incremental response reads. A concrete transport advertises which of
//! these it supports through `TransportCapabilities`; the engines degrade
//! to buffered `send` for anything that is missing.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use thiserror::Error;

use crate::error::ClientError;
use crate::http::{HttpRequest, HttpResponse};

#[cfg(feature = "reqwest")]
mod reqwest_transport;

#[cfg(feature = "reqwest")]
pub use self::reqwest_transport::{ReqwestTransport, DEFAULT_UPLOAD_CHUNK_SIZE};

/// Failures below the HTTP layer. No response was received.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Connect(String),

    #[error("I/O error while reading response: {0}")]
    Io(String),

    #[error("transport does not support {0}")]
    Unsupported(&'static str),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        ClientError::transport(err.to_string())
    }
}

/// A boxed stream of response body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Receives raw `(loaded, total)` byte counts while a body is sent.
pub type ProgressSink = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// A response whose body has not been read yet.
pub struct StreamingResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: ByteStream,
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Which exchange styles a transport can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportCapabilities {
    pub buffered: bool,
    /// Can report upload-direction byte progress before the response arrives.
    pub progress: bool,
    /// Can expose the response body as it arrives.
    pub streaming: bool,
}

impl TransportCapabilities {
    pub const BUFFERED_ONLY: Self = Self {
        buffered: true,
        progress: false,
        streaming: false,
    };

    pub const ALL: Self = Self {
        buffered: true,
        progress: true,
        streaming: true,
    };
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn capabilities(&self) -> TransportCapabilities;

    /// Perform a request and buffer the whole response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Perform a request, reporting body bytes handed to the connection.
    async fn send_with_progress(
        &self,
        request: HttpRequest,
        progress: ProgressSink,
    ) -> Result<HttpResponse, TransportError> {
        let _ = (request, progress);
        Err(TransportError::Unsupported("upload progress"))
    }

    /// Perform a request and return before the body has been read.
    async fn send_streaming(&self, request: HttpRequest) -> Result<StreamingResponse, TransportError> {
        let _ = request;
        Err(TransportError::Unsupported("streaming responses"))
    }
}
