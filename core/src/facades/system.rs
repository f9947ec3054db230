use crate::client::ApiClient;
use crate::descriptor::RequestDescriptor;
use crate::error::ClientError;
use crate::types::{ApiInfo, HealthStatus};

/// Unauthenticated status probes.
pub struct SystemApi<'a> {
    client: &'a ApiClient,
}

impl<'a> SystemApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        self.client
            .request(RequestDescriptor::get("/health").without_auth())
            .await
    }

    pub async fn info(&self) -> Result<ApiInfo, ClientError> {
        self.client
            .request(RequestDescriptor::get("/api/v1/info").without_auth())
            .await
    }
}
