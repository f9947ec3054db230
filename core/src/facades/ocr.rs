//! OCR on the integration service.
//!
//! Unlike the base engines this facade has a deadline: a processing call
//! that outlives it is cancelled and fails with `ErrorKind::Timeout`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::client::ApiClient;
use crate::config::Service;
use crate::descriptor::RequestDescriptor;
use crate::error::ClientError;
use crate::types::{HealthStatus, OcrOptions, OcrResult};
use crate::upload::{ProgressCallback, UploadFile, UploadRequest};

pub const DEFAULT_OCR_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OcrApi<'a> {
    client: &'a ApiClient,
    timeout: Duration,
}

impl<'a> OcrApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self {
            client,
            timeout: DEFAULT_OCR_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn process(
        &self,
        file: UploadFile,
        options: &OcrOptions,
        on_progress: Option<ProgressCallback>,
    ) -> Result<OcrResult, ClientError> {
        let cancel = CancellationToken::new();
        let mut request = UploadRequest::new("/api/v1/ocr/process", file)
            .service(Service::Integration)
            .cancel_on(cancel.clone());
        if let Some(language) = &options.language {
            request = request.field("language", language.as_str());
        }
        if options.extract_structure {
            request = request.field("extract_structure", "true");
        }

        let call = self.client.upload(request, on_progress);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                warn!(timeout_secs = self.timeout.as_secs(), "OCR processing timed out");
                Err(ClientError::timeout(self.timeout))
            }
        }
    }

    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        self.client
            .request(
                RequestDescriptor::get("/health")
                    .service(Service::Integration)
                    .without_auth(),
            )
            .await
    }
}
