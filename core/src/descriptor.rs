//! Per-call request descriptions and decoded response bodies.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::Service;
use crate::error::ClientError;
use crate::http::HttpMethod;
use crate::query::QueryParams;

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Raw { content_type: String, data: Bytes },
}

/// Everything the engines need to issue one call. Consumed by the call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub path: String,
    pub service: Service,
    pub query: Option<QueryParams>,
    pub body: Option<RequestBody>,
    /// Overrides merged over the default JSON headers.
    pub headers: Vec<(String, String)>,
    /// Attach the bearer token when one is stored.
    pub authenticated: bool,
    pub cancel: Option<CancellationToken>,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            service: Service::Api,
            query: None,
            body: None,
            headers: Vec::new(),
            authenticated: true,
            cancel: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn query(mut self, params: QueryParams) -> Self {
        self.query = Some(params);
        self
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ClientError> {
        let value = serde_json::to_value(body).map_err(ClientError::encode)?;
        self.body = Some(RequestBody::Json(value));
        Ok(self)
    }

    pub fn json_value(mut self, value: Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    pub fn raw(mut self, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Raw {
            content_type: content_type.into(),
            data: data.into(),
        });
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn service(mut self, service: Service) -> Self {
        self.service = service;
        self
    }

    /// Never send the bearer token, even when one is stored.
    pub fn without_auth(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// A successful response body, branched on content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
    /// No body at all (e.g. 204).
    Empty,
}

impl ResponseBody {
    /// Decode into `T`. Text bodies decode into string targets and empty
    /// bodies into `()` or `Option`; anything else is a decode failure that
    /// keeps `status`.
    pub fn decode<T: DeserializeOwned>(self, status: u16) -> Result<T, ClientError> {
        let value = match self {
            ResponseBody::Json(value) => value,
            ResponseBody::Text(text) => Value::String(text),
            ResponseBody::Empty => Value::Null,
        };
        serde_json::from_value(value).map_err(|e| ClientError::decode(status, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_are_authenticated_api_calls() {
        let d = RequestDescriptor::get("/api/v1/notes");
        assert_eq!(d.method, HttpMethod::Get);
        assert_eq!(d.service, Service::Api);
        assert!(d.authenticated);
        assert!(d.body.is_none());
    }

    #[test]
    fn json_body_is_captured() {
        let d = RequestDescriptor::post("/x")
            .json(&serde_json::json!({"title": "t"}))
            .unwrap();
        assert!(matches!(d.body, Some(RequestBody::Json(ref v)) if v["title"] == "t"));
    }

    #[test]
    fn text_decodes_into_string() {
        let s: String = ResponseBody::Text("pong".into()).decode(200).unwrap();
        assert_eq!(s, "pong");
    }

    #[test]
    fn empty_decodes_into_unit_and_option() {
        ResponseBody::Empty.decode::<()>(204).unwrap();
        let none: Option<u32> = ResponseBody::Empty.decode(204).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn shape_mismatch_is_decode_error_with_status() {
        #[derive(Debug, serde::Deserialize)]
        struct Expected {
            #[allow(dead_code)]
            id: String,
        }
        let err = ResponseBody::Text("<html>".into())
            .decode::<Expected>(200)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(err.status(), Some(200));
    }
}
