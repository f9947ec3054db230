use crate::client::ApiClient;
use crate::descriptor::RequestDescriptor;
use crate::error::ClientError;
use crate::types::{ChatRequest, ChatResponse};

const CHAT: &str = "/api/v1/chat";

pub struct ChatApi<'a> {
    client: &'a ApiClient,
}

impl<'a> ChatApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Buffered reply.
    pub async fn send(&self, request: &ChatRequest) -> Result<ChatResponse, ClientError> {
        let body = ChatRequest {
            stream: false,
            ..request.clone()
        };
        self.client
            .request(RequestDescriptor::post(CHAT).json(&body)?)
            .await
    }

    /// Incremental reply, delivered through the streaming engine.
    pub async fn stream<C, D, E>(&self, request: &ChatRequest, on_chunk: C, on_complete: D, on_error: E)
    where
        C: FnMut(&str),
        D: FnOnce(),
        E: FnOnce(ClientError),
    {
        let body = ChatRequest {
            stream: true,
            ..request.clone()
        };
        let descriptor = match RequestDescriptor::post(CHAT).json(&body) {
            Ok(descriptor) => descriptor.header("accept", "text/plain"),
            Err(e) => return on_error(e),
        };
        self.client
            .stream(descriptor, on_chunk, on_complete, on_error)
            .await
    }
}
