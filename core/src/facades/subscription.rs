use crate::client::ApiClient;
use crate::descriptor::RequestDescriptor;
use crate::error::ClientError;
use crate::types::{QuotaCheck, SubscriptionStatus, Usage};

pub struct SubscriptionApi<'a> {
    client: &'a ApiClient,
}

impl<'a> SubscriptionApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn status(&self) -> Result<SubscriptionStatus, ClientError> {
        self.client
            .request(RequestDescriptor::get("/api/v1/subscription"))
            .await
    }

    pub async fn usage(&self) -> Result<Usage, ClientError> {
        self.client
            .request(RequestDescriptor::get("/api/v1/subscription/usage"))
            .await
    }

    /// Whether one more use of `resource` (e.g. `"ocr"`) fits the plan.
    pub async fn check_quota(&self, resource: &str) -> Result<QuotaCheck, ClientError> {
        let usage = self.usage().await?;
        Ok(QuotaCheck::evaluate(resource, usage.usage.get(resource).copied()))
    }
}
