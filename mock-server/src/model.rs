//! Wire types served by the mock backend.
//!
//! Field names follow the backend's camelCase JSON. Owner ids and password
//! hashes never leave the server.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub tier: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthInput {
    pub code: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl<T> Paginated<T> {
    /// Slice one page out of `items`. `page` is 1-based.
    pub fn of(items: Vec<T>, page: u32, page_size: u32) -> Self {
        let total = items.len() as u64;
        let total_pages = total.div_ceil(u64::from(page_size)) as u32;
        let skip = (page.saturating_sub(1) as usize) * page_size as usize;
        Self {
            items: items.into_iter().skip(skip).take(page_size as usize).collect(),
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip)]
    pub owner_id: String,
}

#[derive(Deserialize)]
pub struct CreateNote {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Deserialize)]
pub struct UpdateNote {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    pub merchant: Option<String>,
    pub total: Option<f64>,
    pub currency: Option<String>,
    pub date: Option<String>,
    pub category: Option<String>,
    pub items: Vec<ReceiptItem>,
    pub file_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip)]
    pub owner_id: String,
}

#[derive(Clone, Default, Deserialize)]
pub struct ReceiptInput {
    pub merchant: Option<String>,
    pub total: Option<f64>,
    pub currency: Option<String>,
    pub date: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub items: Vec<ReceiptItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInput {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    pub conversation_id: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub bucket: String,
    pub path: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub url: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub tier: String,
    pub status: String,
    pub current_period_end: Option<String>,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct Quota {
    pub used: u64,
    pub limit: Option<u64>,
}

#[derive(Serialize, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
}
