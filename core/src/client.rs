//! Authenticated request engine.
//!
//! # Design
//! `ApiClient` is an explicit session object: it owns its configuration,
//! transport and token store, so independent sessions can coexist. Each
//! exchange is split into a pure `build_request` step that produces an
//! `HttpRequest`, a transport round-trip, and a pure `parse_response` step
//! that consumes the `HttpResponse`. Only the round-trip touches the network.
//!
//! A 401 from any engine expires the stored credential (one session event
//! per observed 401) and the caller still receives the `ClientError`.
//! Requests are independent: no ordering, deduplication or caching.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::descriptor::{RequestBody, RequestDescriptor, ResponseBody};
use crate::error::ClientError;
use crate::http::{HttpRequest, HttpResponse};
use crate::query::build_url;
use crate::token_store::{SessionEvent, TokenStore};
use crate::transport::Transport;

const JSON: &str = "application/json";

#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.inner.config)
            .field("tokens", &self.inner.tokens)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>, tokens: TokenStore) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                tokens,
            }),
        }
    }

    /// Client over the default reqwest transport, storing the credential in
    /// `storage` under the configured keys.
    #[cfg(feature = "reqwest")]
    pub fn connect(
        config: ClientConfig,
        storage: Arc<dyn crate::storage::KeyValueStore>,
    ) -> Result<Self, ClientError> {
        let transport = crate::transport::ReqwestTransport::new(&config)?;
        let tokens = TokenStore::new(storage, config.storage.clone());
        Ok(Self::new(config, Arc::new(transport), tokens))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    /// Session invalidation events from this client's token store.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.inner.tokens.subscribe()
    }

    /// Turn a descriptor into a wire request: URL, merged headers, bearer
    /// token and serialized body.
    pub fn build_request(&self, descriptor: &RequestDescriptor) -> HttpRequest {
        let base = self.inner.config.base_url(descriptor.service);
        let url = build_url(base, &descriptor.path, descriptor.query.as_ref());

        let (content_type, body) = match &descriptor.body {
            Some(RequestBody::Json(value)) => (None, Some(value.to_string().into())),
            Some(RequestBody::Raw { content_type, data }) => {
                (Some(content_type.as_str()), Some(data.clone()))
            }
            None => (None, None),
        };

        HttpRequest {
            method: descriptor.method,
            url,
            headers: self.compose_headers(&descriptor.headers, content_type, descriptor.authenticated),
            body,
        }
    }

    /// Defaults, then caller overrides, then the body's content type, then
    /// the bearer token.
    pub(crate) fn compose_headers(
        &self,
        overrides: &[(String, String)],
        content_type: Option<&str>,
        authenticated: bool,
    ) -> Vec<(String, String)> {
        let mut headers = vec![
            ("content-type".to_string(), JSON.to_string()),
            ("accept".to_string(), JSON.to_string()),
        ];
        for (name, value) in overrides {
            set_header(&mut headers, name, value);
        }
        if let Some(content_type) = content_type {
            set_header(&mut headers, "content-type", content_type);
        }
        if authenticated {
            if let Some(token) = self.inner.tokens.get() {
                set_header(&mut headers, "authorization", &format!("Bearer {token}"));
            }
        }
        headers
    }

    /// Normalize a response: non-2xx becomes a `ClientError`, JSON bodies are
    /// parsed, anything else is returned as text.
    pub fn parse_response(&self, response: HttpResponse) -> Result<ResponseBody, ClientError> {
        if !response.is_success() {
            return Err(ClientError::from_response(
                response.status,
                &response.status_text,
                &response.body,
            ));
        }
        if response.body.is_empty() {
            return Ok(ResponseBody::Empty);
        }
        if response.is_json() {
            return serde_json::from_slice(&response.body)
                .map(ResponseBody::Json)
                .map_err(|e| ClientError::decode(response.status, e));
        }
        Ok(ResponseBody::Text(
            String::from_utf8_lossy(&response.body).into_owned(),
        ))
    }

    /// Issue a buffered request and decode the body into `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<T, ClientError> {
        let (status, body) = self.exchange(descriptor).await?;
        body.decode(status)
    }

    /// Issue a buffered request and return the body without decoding it.
    pub async fn request_body(&self, descriptor: RequestDescriptor) -> Result<ResponseBody, ClientError> {
        self.exchange(descriptor).await.map(|(_, body)| body)
    }

    async fn exchange(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<(u16, ResponseBody), ClientError> {
        let request = self.build_request(&descriptor);
        self.log_request(&request);

        let transport = self.inner.transport.clone();
        let response = with_cancel(descriptor.cancel.as_ref(), async move {
            transport.send(request).await.map_err(ClientError::from)
        })
        .await
        .inspect_err(|e| debug!(error = %e, "request did not complete"))?;

        self.observe(response.status, &response.status_text);
        let status = response.status;
        let body = self.parse_response(response)?;
        Ok((status, body))
    }

    /// Side effects every engine applies once a response status is known.
    pub(crate) fn observe(&self, status: u16, status_text: &str) {
        if self.inner.config.debug {
            debug!(status, status_text, "response received");
        }
        if status == 401 {
            warn!("backend rejected the session; clearing stored credential");
            self.inner.tokens.expire();
        }
    }

    pub(crate) fn log_request(&self, request: &HttpRequest) {
        if self.inner.config.debug {
            debug!(
                method = %request.method,
                url = %request.url,
                body_bytes = request.body.as_ref().map_or(0, |b| b.len()),
                authenticated = request.header("authorization").is_some(),
                "sending request"
            );
        }
    }
}

/// Replace `name` (case-insensitively) or append it.
pub(crate) fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
        Some(entry) => entry.1 = value.to_string(),
        None => headers.push((name.to_ascii_lowercase(), value.to_string())),
    }
}

/// Run `fut`, failing with `ErrorKind::Cancelled` if `cancel` fires first.
pub(crate) async fn with_cancel<T, F>(
    cancel: Option<&CancellationToken>,
    fut: F,
) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(ClientError::cancelled()),
                result = fut => result,
            }
        }
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Service;
    use crate::error::ErrorKind;
    use crate::http::HttpMethod;
    use crate::query::QueryParams;
    use crate::transport::{TransportCapabilities, TransportError};
    use crate::types::User;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        fn capabilities(&self) -> TransportCapabilities {
            TransportCapabilities::BUFFERED_ONLY
        }

        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Connect("unreachable".into()))
        }
    }

    fn client() -> ApiClient {
        let config = ClientConfig {
            integration_base_url: "http://ocr.test".into(),
            ..ClientConfig::with_base_url("http://api.test/")
        };
        ApiClient::new(config, Arc::new(Unreachable), TokenStore::in_memory())
    }

    fn user() -> User {
        User {
            id: "u1".into(),
            email: "a@b.c".into(),
            name: None,
            tier: "free".into(),
        }
    }

    #[test]
    fn build_get_without_token() {
        let req = client().build_request(&RequestDescriptor::get("/health"));
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://api.test/health");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("accept"), Some("application/json"));
        assert_eq!(req.header("authorization"), None);
        assert!(req.body.is_none());
    }

    #[test]
    fn build_attaches_bearer_token() {
        let c = client();
        c.tokens().set("tok-1", &user()).unwrap();
        let req = c.build_request(&RequestDescriptor::get("/api/v1/notes"));
        assert_eq!(req.header("Authorization"), Some("Bearer tok-1"));
    }

    #[test]
    fn without_auth_skips_token() {
        let c = client();
        c.tokens().set("tok-1", &user()).unwrap();
        let req = c.build_request(&RequestDescriptor::post("/api/v1/auth/login").without_auth());
        assert_eq!(req.header("authorization"), None);
    }

    #[test]
    fn overrides_replace_defaults() {
        let req = client().build_request(
            &RequestDescriptor::get("/x")
                .header("Accept", "text/event-stream")
                .header("X-Request-Id", "abc"),
        );
        assert_eq!(req.header("accept"), Some("text/event-stream"));
        assert_eq!(req.header("x-request-id"), Some("abc"));
        assert_eq!(req.headers.len(), 3);
    }

    #[test]
    fn build_json_body_and_query() {
        let req = client().build_request(
            &RequestDescriptor::patch("/api/v1/notes/n1")
                .query(QueryParams::new().with("notify", true))
                .json(&serde_json::json!({"title": "Updated"}))
                .unwrap(),
        );
        assert_eq!(req.url, "http://api.test/api/v1/notes/n1?notify=true");
        let body: serde_json::Value = serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
        assert_eq!(body["title"], "Updated");
    }

    #[test]
    fn raw_body_sets_content_type() {
        let req = client().build_request(&RequestDescriptor::post("/x").raw("text/plain", "hi"));
        assert_eq!(req.header("content-type"), Some("text/plain"));
        assert_eq!(req.body.as_deref(), Some(&b"hi"[..]));
    }

    #[test]
    fn integration_service_uses_its_base() {
        let req = client().build_request(
            &RequestDescriptor::post("/api/v1/ocr/process").service(Service::Integration),
        );
        assert_eq!(req.url, "http://ocr.test/api/v1/ocr/process");
    }

    #[test]
    fn parse_json_success() {
        let body = client()
            .parse_response(HttpResponse::json(200, &serde_json::json!({"status": "healthy"})))
            .unwrap();
        assert_eq!(body, ResponseBody::Json(serde_json::json!({"status": "healthy"})));
    }

    #[test]
    fn parse_text_success() {
        let resp = HttpResponse::new(200, "pong").with_header("content-type", "text/plain");
        assert_eq!(
            client().parse_response(resp).unwrap(),
            ResponseBody::Text("pong".into())
        );
    }

    #[test]
    fn parse_no_content() {
        assert_eq!(
            client().parse_response(HttpResponse::new(204, "")).unwrap(),
            ResponseBody::Empty
        );
    }

    #[test]
    fn parse_malformed_json_keeps_status() {
        let resp = HttpResponse::new(201, "{oops").with_header("content-type", "application/json");
        let err = client().parse_response(resp).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.status(), Some(201));
    }

    #[test]
    fn parse_error_status() {
        let resp = HttpResponse::json(404, &serde_json::json!({"error": "Not found"}));
        let err = client().parse_response(resp).unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.message(), "Not found");
    }

    #[tokio::test]
    async fn transport_failure_has_no_status() {
        let err = client()
            .request::<serde_json::Value>(RequestDescriptor::get("/health"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn pre_cancelled_request_fails_fast() {
        let token = CancellationToken::new();
        token.cancel();
        let err = client()
            .request::<serde_json::Value>(RequestDescriptor::get("/health").cancel_on(token))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn set_header_is_case_insensitive() {
        let mut headers = vec![("Content-Type".to_string(), "a".to_string())];
        set_header(&mut headers, "content-type", "b");
        assert_eq!(headers, vec![("Content-Type".to_string(), "b".to_string())]);
    }
}
