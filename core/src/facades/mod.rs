//! Resource-specific facades over the engines.
//!
//! Each facade borrows the client and maps one backend resource onto
//! `request`, `upload` and `stream` calls. They hold no state of their own.

mod auth;
mod chat;
mod files;
mod notes;
mod ocr;
mod receipts;
mod subscription;
mod system;

pub use auth::AuthApi;
pub use chat::ChatApi;
pub use files::FilesApi;
pub use notes::NotesApi;
pub use ocr::{OcrApi, DEFAULT_OCR_TIMEOUT};
pub use receipts::ReceiptsApi;
pub use subscription::SubscriptionApi;
pub use system::SystemApi;

use crate::client::ApiClient;

impl ApiClient {
    pub fn system(&self) -> SystemApi<'_> {
        SystemApi::new(self)
    }

    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi::new(self)
    }

    pub fn notes(&self) -> NotesApi<'_> {
        NotesApi::new(self)
    }

    pub fn receipts(&self) -> ReceiptsApi<'_> {
        ReceiptsApi::new(self)
    }

    pub fn chat(&self) -> ChatApi<'_> {
        ChatApi::new(self)
    }

    pub fn files(&self) -> FilesApi<'_> {
        FilesApi::new(self)
    }

    pub fn subscription(&self) -> SubscriptionApi<'_> {
        SubscriptionApi::new(self)
    }

    pub fn ocr(&self) -> OcrApi<'_> {
        OcrApi::new(self)
    }
}
