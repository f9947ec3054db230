//! Wire DTOs for the Notaku backend.
//!
//! # Design
//! These mirror the mock-server's schema but are defined independently;
//! the integration tests catch drift between the two crates. Timestamps stay
//! as the ISO-8601 strings the backend sends.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Session ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Display name.
    #[serde(default, alias = "display_name", alias = "displayName")]
    pub name: Option<String>,
    #[serde(default = "default_tier")]
    pub tier: String,
}

fn default_tier() -> String {
    "free".to_string()
}

/// Bearer token plus the user it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Authorization code handed back by a third-party identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthExchange {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

// ── System ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub app: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub environment: Option<String>,
}

// ── Pagination ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

// ── Notes ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNote {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Only the fields present are applied; omitted fields stay unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNote {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search: Option<String>,
    pub tags: Vec<String>,
}

// ── Receipts ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub items: Vec<ReceiptItem>,
    #[serde(default)]
    pub file_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateReceipt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub items: Vec<ReceiptItem>,
}

/// Full replacement body for `PUT /receipts/:id`.
pub type UpdateReceipt = CreateReceipt;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

// ── Chat ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: None,
            stream: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub reply: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

// ── Files ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub bucket: String,
    pub path: String,
    pub size: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

// ── Subscription ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub tier: String,
    pub status: String,
    #[serde(default)]
    pub current_period_end: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub used: u64,
    /// `None` means unlimited.
    #[serde(default)]
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub tier: String,
    #[serde(default)]
    pub usage: BTreeMap<String, QuotaUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaCheck {
    pub resource: String,
    pub allowed: bool,
    pub used: u64,
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
}

impl QuotaCheck {
    /// Resources the backend does not meter are allowed and unlimited.
    pub fn evaluate(resource: &str, usage: Option<QuotaUsage>) -> Self {
        let usage = usage.unwrap_or(QuotaUsage { used: 0, limit: None });
        let remaining = usage.limit.map(|limit| limit.saturating_sub(usage.used));
        Self {
            resource: resource.to_string(),
            allowed: remaining.map_or(true, |r| r > 0),
            used: usage.used,
            limit: usage.limit,
            remaining,
        }
    }
}

// ── OCR ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct OcrOptions {
    pub language: Option<String>,
    /// Ask the integration service for structured receipt fields too.
    pub extract_structure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub structured: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_accepts_display_name_alias_and_default_tier() {
        let user: User =
            serde_json::from_str(r#"{"id":"1","email":"a@b.c","display_name":"Ann"}"#).unwrap();
        assert_eq!(user.name.as_deref(), Some("Ann"));
        assert_eq!(user.tier, "free");
    }

    #[test]
    fn paginated_uses_camel_case_fields() {
        let page: Paginated<Note> = serde_json::from_str(
            r#"{"items":[],"total":0,"page":1,"pageSize":20,"totalPages":0}"#,
        )
        .unwrap();
        assert_eq!(page.page_size, 20);
        assert!(page.items.is_empty());
    }

    #[test]
    fn update_note_omits_absent_fields() {
        let body = serde_json::to_value(UpdateNote {
            title: Some("New".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"title": "New"}));
    }

    #[test]
    fn chat_request_only_sends_stream_flag_when_set() {
        let plain = serde_json::to_value(ChatRequest::new("hi")).unwrap();
        assert!(plain.get("stream").is_none());
        let streamed = serde_json::to_value(ChatRequest {
            stream: true,
            ..ChatRequest::new("hi")
        })
        .unwrap();
        assert_eq!(streamed["stream"], true);
    }

    #[test]
    fn quota_check_limits() {
        let exhausted = QuotaCheck::evaluate("ocr", Some(QuotaUsage { used: 10, limit: Some(10) }));
        assert!(!exhausted.allowed);
        assert_eq!(exhausted.remaining, Some(0));

        let open = QuotaCheck::evaluate("notes", Some(QuotaUsage { used: 3, limit: Some(50) }));
        assert!(open.allowed);
        assert_eq!(open.remaining, Some(47));

        let unlimited = QuotaCheck::evaluate("chat", Some(QuotaUsage { used: 999, limit: None }));
        assert!(unlimited.allowed);
        assert_eq!(unlimited.remaining, None);

        let unknown = QuotaCheck::evaluate("exports", None);
        assert!(unknown.allowed);
    }
}
