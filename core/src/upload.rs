//! Progress-tracked multipart uploads.
//!
//! The body is encoded up front so its exact length is known; a transport
//! with the `progress` capability then reports bytes as they are handed to
//! the connection. Percentages are rounded, clamped to 100, never go
//! backwards, and end at 100 when the upload succeeds. There is no retry and
//! no default timeout.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::client::{with_cancel, ApiClient};
use crate::config::Service;
use crate::error::ClientError;
use crate::http::{HttpMethod, HttpRequest};
use crate::query::build_url;
use crate::transport::ProgressSink;

/// Progress callback handed to the upload engine.
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: u64,
    /// 0..=100
    pub percentage: u8,
}

impl UploadProgress {
    pub fn new(loaded: u64, total: u64) -> Self {
        let loaded = loaded.min(total);
        let percentage = if total == 0 {
            100
        } else {
            ((loaded as f64 / total as f64) * 100.0).round().min(100.0) as u8
        };
        Self {
            loaded,
            total,
            percentage,
        }
    }
}

/// Turns raw transport ticks into a monotonic progress sequence.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: Option<UploadProgress>,
}

impl ProgressTracker {
    /// `None` for ticks that would move backwards or repeat the last one.
    pub fn tick(&mut self, loaded: u64, total: u64) -> Option<UploadProgress> {
        let next = UploadProgress::new(loaded, total);
        if let Some(last) = self.last {
            if next.loaded <= last.loaded || next.percentage < last.percentage {
                return None;
            }
        }
        self.last = Some(next);
        Some(next)
    }

    /// The terminal 100% tick, unless it was already reported.
    pub fn finish(&mut self, total: u64) -> Option<UploadProgress> {
        if let Some(last) = self.last {
            if last.loaded >= total && last.percentage == 100 {
                return None;
            }
        }
        let done = UploadProgress {
            loaded: total,
            total,
            percentage: 100,
        };
        self.last = Some(done);
        Some(done)
    }
}

/// A file to send as one multipart part.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub field_name: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            field_name: "file".to_string(),
            file_name: file_name.into(),
            content_type: "application/octet-stream".to_string(),
            data: data.into(),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, data))
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self
    }
}

#[derive(Debug, Clone)]
enum Part {
    Text { name: String, value: String },
    File(UploadFile),
}

/// `multipart/form-data` body encoder.
#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::with_boundary(format!("----notaku-{}", Uuid::new_v4().simple()))
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(mut self, file: UploadFile) -> Self {
        self.parts.push(Part::File(file));
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        for part in &self.parts {
            buf.put_slice(format!("--{}\r\n", self.boundary).as_bytes());
            match part {
                Part::Text { name, value } => {
                    buf.put_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                            escape_quoted(name)
                        )
                        .as_bytes(),
                    );
                    buf.put_slice(value.as_bytes());
                }
                Part::File(file) => {
                    buf.put_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                            escape_quoted(&file.field_name),
                            escape_quoted(&file.file_name),
                            file.content_type
                        )
                        .as_bytes(),
                    );
                    buf.put_slice(&file.data);
                }
            }
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        buf.freeze()
    }
}

/// Quotes and line breaks are percent-encoded the way browsers do.
fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// One upload call: a file plus scalar fields, posted to `path`.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub path: String,
    pub service: Service,
    pub file: UploadFile,
    pub fields: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub cancel: Option<CancellationToken>,
}

impl UploadRequest {
    pub fn new(path: impl Into<String>, file: UploadFile) -> Self {
        Self {
            path: path.into(),
            service: Service::Api,
            file,
            fields: Vec::new(),
            headers: Vec::new(),
            cancel: None,
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
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

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl ApiClient {
    /// Post `request` as multipart and decode the JSON response into `T`.
    ///
    /// Falls back to a buffered send when the transport cannot report
    /// progress; the callback then only sees the terminal tick.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        request: UploadRequest,
        on_progress: Option<ProgressCallback>,
    ) -> Result<T, ClientError> {
        let UploadRequest {
            path,
            service,
            file,
            fields,
            headers,
            cancel,
        } = request;

        let form = fields
            .into_iter()
            .fold(MultipartForm::new(), |form, (name, value)| form.text(name, value))
            .file(file);
        let content_type = form.content_type();
        let body = form.encode();
        let total = body.len() as u64;

        let http_request = HttpRequest {
            method: HttpMethod::Post,
            url: build_url(self.config().base_url(service), &path, None),
            headers: self.compose_headers(&headers, Some(&content_type), true),
            body: Some(body),
        };
        self.log_request(&http_request);

        let tracker = Arc::new(Mutex::new(ProgressTracker::default()));
        let sink: ProgressSink = {
            let tracker = tracker.clone();
            let on_progress = on_progress.clone();
            Arc::new(move |loaded: u64, total: u64| {
                let next = tracker
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .tick(loaded, total);
                if let (Some(progress), Some(callback)) = (next, &on_progress) {
                    callback(progress);
                }
            })
        };

        let transport = self.transport().clone();
        let response = with_cancel(cancel.as_ref(), async move {
            let sent = if transport.capabilities().progress {
                transport.send_with_progress(http_request, sink).await
            } else {
                transport.send(http_request).await
            };
            sent.map_err(ClientError::from)
        })
        .await
        .inspect_err(|e| debug!(error = %e, "upload did not complete"))?;

        self.observe(response.status, &response.status_text);
        if !response.is_success() {
            return Err(ClientError::from_response(
                response.status,
                &response.status_text,
                &response.body,
            ));
        }
        let value = serde_json::from_slice(&response.body)
            .map_err(|e| ClientError::decode(response.status, e))?;

        let done = tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finish(total);
        if let (Some(progress), Some(callback)) = (done, &on_progress) {
            callback(progress);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_rounds_and_clamps() {
        assert_eq!(UploadProgress::new(1, 3).percentage, 33);
        assert_eq!(UploadProgress::new(2, 3).percentage, 67);
        assert_eq!(UploadProgress::new(5, 3).percentage, 100);
        assert_eq!(UploadProgress::new(5, 3).loaded, 3);
        assert_eq!(UploadProgress::new(0, 0).percentage, 100);
    }

    #[test]
    fn tracker_drops_regressions_and_repeats() {
        let mut t = ProgressTracker::default();
        assert_eq!(t.tick(10, 100).map(|p| p.percentage), Some(10));
        assert!(t.tick(5, 100).is_none());
        assert!(t.tick(10, 100).is_none());
        assert_eq!(t.tick(50, 100).map(|p| p.percentage), Some(50));
    }

    #[test]
    fn tracker_finish_reports_once() {
        let mut t = ProgressTracker::default();
        t.tick(40, 100);
        assert_eq!(t.finish(100).map(|p| p.percentage), Some(100));
        assert!(t.finish(100).is_none());

        let mut complete = ProgressTracker::default();
        complete.tick(100, 100);
        assert!(complete.finish(100).is_none());
    }

    #[test]
    fn multipart_layout() {
        let body = MultipartForm::with_boundary("XYZ")
            .text("bucket", "receipts")
            .file(UploadFile::new("r.jpg", &b"JPEG"[..]).with_content_type("image/jpeg"))
            .encode();
        let expected = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"bucket\"\r\n\r\n\
            receipts\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"r.jpg\"\r\n\
            Content-Type: image/jpeg\r\n\r\n\
            JPEG\r\n\
            --XYZ--\r\n";
        assert_eq!(body, Bytes::from(expected));
    }

    #[test]
    fn multipart_escapes_quotes_in_file_names() {
        let body = MultipartForm::with_boundary("B")
            .file(UploadFile::new("a\"b.txt", &b""[..]))
            .encode();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("filename=\"a%22b.txt\""));
    }

    #[test]
    fn content_type_carries_boundary() {
        let form = MultipartForm::new();
        assert!(form.content_type().starts_with("multipart/form-data; boundary=----notaku-"));
    }

    #[tokio::test]
    async fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, b"png-bytes").unwrap();
        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.file_name, "scan.png");
        assert_eq!(&file.data[..], b"png-bytes");
    }
}
