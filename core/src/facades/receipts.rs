use crate::client::ApiClient;
use crate::descriptor::RequestDescriptor;
use crate::error::ClientError;
use crate::query::QueryParams;
use crate::types::{CreateReceipt, Paginated, Receipt, ReceiptQuery, UpdateReceipt};
use crate::upload::{ProgressCallback, UploadFile, UploadRequest};

const RECEIPTS: &str = "/api/v1/receipts";

pub struct ReceiptsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> ReceiptsApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &ReceiptQuery) -> Result<Paginated<Receipt>, ClientError> {
        let params = QueryParams::from_serialize(query)?;
        self.client
            .request(RequestDescriptor::get(RECEIPTS).query(params))
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Receipt, ClientError> {
        self.client
            .request(RequestDescriptor::get(format!("{RECEIPTS}/{id}")))
            .await
    }

    pub async fn create(&self, input: &CreateReceipt) -> Result<Receipt, ClientError> {
        self.client
            .request(RequestDescriptor::post(RECEIPTS).json(input)?)
            .await
    }

    pub async fn update(&self, id: &str, input: &UpdateReceipt) -> Result<Receipt, ClientError> {
        self.client
            .request(RequestDescriptor::put(format!("{RECEIPTS}/{id}")).json(input)?)
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        self.client
            .request_body(RequestDescriptor::delete(format!("{RECEIPTS}/{id}")))
            .await
            .map(|_| ())
    }

    /// Upload a receipt image for processing. `fields` travel as extra
    /// form fields (e.g. `category`).
    pub async fn upload(
        &self,
        file: UploadFile,
        fields: &[(&str, &str)],
        on_progress: Option<ProgressCallback>,
    ) -> Result<Receipt, ClientError> {
        let request = fields
            .iter()
            .fold(UploadRequest::new(format!("{RECEIPTS}/upload"), file), |req, (k, v)| {
                req.field(*k, *v)
            });
        self.client.upload(request, on_progress).await
    }
}
