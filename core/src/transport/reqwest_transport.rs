//! reqwest-backed transport (async, rustls).
//!
//! Upload progress is measured on the request side: the prepared body is
//! handed to the connection in fixed-size chunks and the sink is told about
//! each one as it is pulled.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};

use super::{ProgressSink, StreamingResponse, Transport, TransportCapabilities, TransportError};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    chunk_size: usize,
}

impl ReqwestTransport {
    /// Build a client following the configured user agent and
    /// credential-inclusion policy (a cookie jar is kept when credentials
    /// are included).
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .cookie_store(config.include_credentials)
            .build()
            .map_err(|e| ClientError::transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(http))
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn builder(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.http.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities::ALL
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.builder(&request);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await.map_err(connect_error)?;
        buffer(response).await
    }

    async fn send_with_progress(
        &self,
        request: HttpRequest,
        progress: ProgressSink,
    ) -> Result<HttpResponse, TransportError> {
        let body = request.body.clone().unwrap_or_default();
        let total = body.len() as u64;
        let chunks: Vec<Bytes> = (0..body.len())
            .step_by(self.chunk_size)
            .map(|start| body.slice(start..(start + self.chunk_size).min(body.len())))
            .collect();

        let mut loaded = 0u64;
        let counted = stream::iter(chunks).map(move |chunk| {
            loaded += chunk.len() as u64;
            progress(loaded, total);
            Ok::<_, std::io::Error>(chunk)
        });

        let response = self
            .builder(&request)
            .header(reqwest::header::CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(counted))
            .send()
            .await
            .map_err(connect_error)?;
        buffer(response).await
    }

    async fn send_streaming(&self, request: HttpRequest) -> Result<StreamingResponse, TransportError> {
        let mut builder = self.builder(&request);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        let response = builder.send().await.map_err(connect_error)?;
        let status = response.status();
        let headers = header_pairs(response.headers());
        let body = response
            .bytes_stream()
            .map_err(|e| TransportError::Io(e.to_string()))
            .boxed();
        Ok(StreamingResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

fn connect_error(err: reqwest::Error) -> TransportError {
    TransportError::Connect(err.to_string())
}

async fn buffer(response: reqwest::Response) -> Result<HttpResponse, TransportError> {
    let status = response.status();
    let headers = header_pairs(response.headers());
    let body = response
        .bytes()
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;
    Ok(HttpResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body,
    })
}

fn header_pairs(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}
