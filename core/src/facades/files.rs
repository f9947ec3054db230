use crate::client::ApiClient;
use crate::error::ClientError;
use crate::types::UploadedFile;
use crate::upload::{ProgressCallback, UploadFile, UploadRequest};

pub struct FilesApi<'a> {
    client: &'a ApiClient,
}

impl<'a> FilesApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Store `file` in `bucket`.
    pub async fn upload(
        &self,
        bucket: &str,
        file: UploadFile,
        on_progress: Option<ProgressCallback>,
    ) -> Result<UploadedFile, ClientError> {
        let request = UploadRequest::new("/api/v1/files/upload", file).field("bucket", bucket);
        self.client.upload(request, on_progress).await
    }
}
