//! In-memory stand-in for the Notaku backend and its OCR integration
//! service, used by the client core's integration tests.
//!
//! Both services are served from one router. State lives for as long as the
//! router does; nothing is persisted.

pub mod model;

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{
    AuthResponse, ChatInput, ChatReply, CreateNote, LoginInput, Note, OAuthInput, OcrOutput,
    Paginated, Quota, Receipt, ReceiptInput, RegisterInput, StoredFile, Subscription, UpdateNote,
    User,
};

/// Uploads up to this size are accepted.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

struct Account {
    user: User,
    password: String,
}

#[derive(Default)]
pub struct Store {
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, String>,
    notes: Vec<Note>,
    receipts: Vec<Receipt>,
    ocr_runs: HashMap<String, u64>,
}

impl Store {
    fn user_by_id(&self, id: &str) -> Option<&User> {
        self.accounts.values().map(|a| &a.user).find(|u| u.id == id)
    }

    fn open_session(&mut self, user: &User) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.insert(token.clone(), user.id.clone());
        token
    }

    fn usage(&self, user: &User) -> Vec<(&'static str, Quota)> {
        let free = user.tier == "free";
        let limit = |n: u64| free.then_some(n);
        let notes = self.notes.iter().filter(|n| n.owner_id == user.id).count() as u64;
        let receipts = self.receipts.iter().filter(|r| r.owner_id == user.id).count() as u64;
        let ocr = self.ocr_runs.get(&user.id).copied().unwrap_or(0);
        vec![
            ("notes", Quota { used: notes, limit: limit(100) }),
            ("receipts", Quota { used: receipts, limit: limit(50) }),
            ("ocr", Quota { used: ocr, limit: limit(10) }),
        ]
    }
}

pub type Db = Arc<RwLock<Store>>;

/// Error responses, shaped the way the real backend sends them.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    fn unauthorized(message: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: json!({ "message": message }),
        }
    }

    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: json!({ "error": "Not found" }),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        let detail: String = detail.into();
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "detail": detail }),
        }
    }

    fn conflict(message: &str, code: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            body: json!({ "message": message, "code": code }),
        }
    }

    fn quota_exceeded(resource: &str, limit: u64) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            body: json!({
                "error": "Quota exceeded",
                "code": "QUOTA_EXCEEDED",
                "details": { "resource": resource, "limit": limit },
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// The user behind a valid `Authorization: Bearer` header.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<Db> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, db: &Db) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))?;
        let store = db.read().await;
        let user = store
            .sessions
            .get(token)
            .and_then(|id| store.user_by_id(id))
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;
        Ok(AuthUser {
            user: user.clone(),
            token: token.to_string(),
        })
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/info", get(api_info))
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/oauth/{provider}", post(oauth))
        .route("/api/v1/auth/me", get(me))
        .route("/api/v1/auth/logout", post(logout))
        .route("/api/v1/notes", get(list_notes).post(create_note))
        .route(
            "/api/v1/notes/{id}",
            get(get_note).patch(update_note).delete(delete_note),
        )
        .route("/api/v1/receipts", get(list_receipts).post(create_receipt))
        .route("/api/v1/receipts/upload", post(upload_receipt))
        .route(
            "/api/v1/receipts/{id}",
            get(get_receipt).put(replace_receipt).delete(delete_receipt),
        )
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/files/upload", post(upload_file))
        .route("/api/v1/subscription", get(subscription))
        .route("/api/v1/subscription/usage", get(usage))
        .route("/api/v1/ocr/process", post(ocr_process))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock backend listening");
    }
    axum::serve(listener, app()).await
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// --- system ---

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "app": "Notaku API" }))
}

async fn api_info() -> Json<Value> {
    Json(json!({
        "name": "Notaku API",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": "mock",
    }))
}

// --- auth ---

async fn register(
    State(db): State<Db>,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    if !input.email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    if input.password.len() < 8 {
        return Err(ApiError::bad_request("Password must be at least 8 characters"));
    }
    let mut store = db.write().await;
    if store.accounts.contains_key(&input.email) {
        return Err(ApiError::conflict("Email already registered", "EMAIL_TAKEN"));
    }
    let user = User {
        id: new_id(),
        email: input.email.clone(),
        name: input.name,
        tier: "free".to_string(),
    };
    store.accounts.insert(
        input.email,
        Account {
            user: user.clone(),
            password: input.password,
        },
    );
    let token = store.open_session(&user);
    info!(user_id = %user.id, "registered");
    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

async fn login(
    State(db): State<Db>,
    Json(input): Json<LoginInput>,
) -> Result<Json<AuthResponse>, ApiError> {
    let mut store = db.write().await;
    let user = match store.accounts.get(&input.email) {
        Some(account) if account.password == input.password => account.user.clone(),
        _ => return Err(ApiError::unauthorized("Invalid email or password")),
    };
    let token = store.open_session(&user);
    Ok(Json(AuthResponse { user, token }))
}

/// Any non-empty code is accepted; the provider decides the identity.
async fn oauth(
    State(db): State<Db>,
    Path(provider): Path<String>,
    Json(input): Json<OAuthInput>,
) -> Result<Json<AuthResponse>, ApiError> {
    if input.code.is_empty() {
        return Err(ApiError::bad_request("Missing authorization code"));
    }
    debug!(%provider, redirect_uri = ?input.redirect_uri, "oauth exchange");
    let email = format!("{}@{provider}.oauth", input.code);
    let mut store = db.write().await;
    let user = store
        .accounts
        .entry(email.clone())
        .or_insert_with(|| Account {
            user: User {
                id: new_id(),
                email,
                name: None,
                tier: "free".to_string(),
            },
            password: String::new(),
        })
        .user
        .clone();
    let token = store.open_session(&user);
    Ok(Json(AuthResponse { user, token }))
}

async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

async fn logout(State(db): State<Db>, auth: AuthUser) -> Json<Value> {
    db.write().await.sessions.remove(&auth.token);
    Json(json!({ "message": "Logged out" }))
}

// --- listing helpers ---

#[derive(Debug)]
struct ListParams {
    page: u32,
    page_size: u32,
    rest: Vec<(String, String)>,
}

impl ListParams {
    fn parse(pairs: Vec<(String, String)>) -> Result<Self, ApiError> {
        let mut params = ListParams {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            rest: Vec::new(),
        };
        for (key, value) in pairs {
            match key.as_str() {
                "page" => {
                    params.page = value
                        .parse()
                        .ok()
                        .filter(|p| *p >= 1)
                        .ok_or_else(|| ApiError::bad_request("page must be a positive integer"))?;
                }
                "pageSize" => {
                    params.page_size = value
                        .parse()
                        .ok()
                        .filter(|s| (1..=MAX_PAGE_SIZE).contains(s))
                        .ok_or_else(|| ApiError::bad_request("pageSize must be between 1 and 100"))?;
                }
                _ => params.rest.push((key, value)),
            }
        }
        Ok(params)
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.rest.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.rest
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

// --- notes ---

async fn list_notes(
    State(db): State<Db>,
    auth: AuthUser,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Paginated<Note>>, ApiError> {
    let params = ListParams::parse(pairs)?;
    let tags: Vec<&str> = params.all("tags").collect();
    let search = params.first("search");
    let store = db.read().await;
    let notes: Vec<Note> = store
        .notes
        .iter()
        .rev()
        .filter(|n| n.owner_id == auth.user.id)
        .filter(|n| tags.iter().all(|t| n.tags.iter().any(|nt| nt == t)))
        .filter(|n| search.map_or(true, |s| contains_ci(&n.title, s) || contains_ci(&n.content, s)))
        .cloned()
        .collect();
    Ok(Json(Paginated::of(notes, params.page, params.page_size)))
}

async fn create_note(
    State(db): State<Db>,
    auth: AuthUser,
    Json(input): Json<CreateNote>,
) -> Result<(StatusCode, Json<Note>), ApiError> {
    if input.title.trim().is_empty() {
        return Err(ApiError::bad_request("title must not be empty"));
    }
    let stamp = now();
    let note = Note {
        id: new_id(),
        title: input.title,
        content: input.content,
        tags: input.tags,
        created_at: stamp.clone(),
        updated_at: stamp,
        owner_id: auth.user.id,
    };
    db.write().await.notes.push(note.clone());
    Ok((StatusCode::CREATED, Json(note)))
}

async fn get_note(
    State(db): State<Db>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Note>, ApiError> {
    let store = db.read().await;
    store
        .notes
        .iter()
        .find(|n| n.id == id && n.owner_id == auth.user.id)
        .cloned()
        .map(Json)
        .ok_or_else(ApiError::not_found)
}

async fn update_note(
    State(db): State<Db>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<UpdateNote>,
) -> Result<Json<Note>, ApiError> {
    let mut store = db.write().await;
    let note = store
        .notes
        .iter_mut()
        .find(|n| n.id == id && n.owner_id == auth.user.id)
        .ok_or_else(ApiError::not_found)?;
    if let Some(title) = input.title {
        note.title = title;
    }
    if let Some(content) = input.content {
        note.content = content;
    }
    if let Some(tags) = input.tags {
        note.tags = tags;
    }
    note.updated_at = now();
    Ok(Json(note.clone()))
}

async fn delete_note(
    State(db): State<Db>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut store = db.write().await;
    let before = store.notes.len();
    store.notes.retain(|n| !(n.id == id && n.owner_id == auth.user.id));
    if store.notes.len() == before {
        return Err(ApiError::not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- receipts ---

fn receipt_from(input: ReceiptInput, owner_id: String, file_name: Option<String>) -> Receipt {
    let stamp = now();
    Receipt {
        id: new_id(),
        merchant: input.merchant,
        total: input.total,
        currency: input.currency,
        date: input.date,
        category: input.category,
        items: input.items,
        file_name,
        created_at: stamp.clone(),
        updated_at: stamp,
        owner_id,
    }
}

async fn list_receipts(
    State(db): State<Db>,
    auth: AuthUser,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Paginated<Receipt>>, ApiError> {
    let params = ListParams::parse(pairs)?;
    let category = params.first("category");
    let search = params.first("search");
    let from = params.first("dateFrom");
    let to = params.first("dateTo");
    let store = db.read().await;
    let receipts: Vec<Receipt> = store
        .receipts
        .iter()
        .rev()
        .filter(|r| r.owner_id == auth.user.id)
        .filter(|r| category.map_or(true, |c| r.category.as_deref() == Some(c)))
        .filter(|r| {
            search.map_or(true, |s| r.merchant.as_deref().is_some_and(|m| contains_ci(m, s)))
        })
        .filter(|r| from.map_or(true, |f| r.date.as_deref().is_some_and(|d| d >= f)))
        .filter(|r| to.map_or(true, |t| r.date.as_deref().is_some_and(|d| d <= t)))
        .cloned()
        .collect();
    Ok(Json(Paginated::of(receipts, params.page, params.page_size)))
}

async fn create_receipt(
    State(db): State<Db>,
    auth: AuthUser,
    Json(input): Json<ReceiptInput>,
) -> (StatusCode, Json<Receipt>) {
    let receipt = receipt_from(input, auth.user.id, None);
    db.write().await.receipts.push(receipt.clone());
    (StatusCode::CREATED, Json(receipt))
}

async fn get_receipt(
    State(db): State<Db>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Receipt>, ApiError> {
    let store = db.read().await;
    store
        .receipts
        .iter()
        .find(|r| r.id == id && r.owner_id == auth.user.id)
        .cloned()
        .map(Json)
        .ok_or_else(ApiError::not_found)
}

async fn replace_receipt(
    State(db): State<Db>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(input): Json<ReceiptInput>,
) -> Result<Json<Receipt>, ApiError> {
    let mut store = db.write().await;
    let receipt = store
        .receipts
        .iter_mut()
        .find(|r| r.id == id && r.owner_id == auth.user.id)
        .ok_or_else(ApiError::not_found)?;
    receipt.merchant = input.merchant;
    receipt.total = input.total;
    receipt.currency = input.currency;
    receipt.date = input.date;
    receipt.category = input.category;
    receipt.items = input.items;
    receipt.updated_at = now();
    Ok(Json(receipt.clone()))
}

async fn delete_receipt(
    State(db): State<Db>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let mut store = db.write().await;
    let before = store.receipts.len();
    store.receipts.retain(|r| !(r.id == id && r.owner_id == auth.user.id));
    if store.receipts.len() == before {
        return Err(ApiError::not_found());
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- multipart ---

struct UploadedPart {
    file_name: String,
    content_type: Option<String>,
    size: u64,
}

/// Collect the `file` part and every text field.
async fn read_form(
    mut multipart: Multipart,
) -> Result<(Option<UploadedPart>, HashMap<String, String>), ApiError> {
    let mut file = None;
    let mut fields = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                file = Some(UploadedPart {
                    file_name,
                    content_type,
                    size: data.len() as u64,
                });
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                fields.insert(name, value);
            }
        }
    }
    Ok((file, fields))
}

async fn upload_receipt(
    State(db): State<Db>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Receipt>), ApiError> {
    let (file, mut fields) = read_form(multipart).await?;
    let file = file.ok_or_else(|| ApiError::bad_request("file is required"))?;
    debug!(file_name = %file.file_name, size = file.size, "receipt upload");
    let input = ReceiptInput {
        category: fields.remove("category"),
        merchant: fields.remove("merchant"),
        ..ReceiptInput::default()
    };
    let receipt = receipt_from(input, auth.user.id, Some(file.file_name));
    db.write().await.receipts.push(receipt.clone());
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn upload_file(
    _auth: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<StoredFile>), ApiError> {
    let (file, fields) = read_form(multipart).await?;
    let file = file.ok_or_else(|| ApiError::bad_request("file is required"))?;
    let bucket = fields
        .get("bucket")
        .filter(|b| !b.is_empty())
        .cloned()
        .ok_or_else(|| ApiError::bad_request("bucket is required"))?;
    let path = format!("{bucket}/{}-{}", Uuid::new_v4().simple(), file.file_name);
    Ok((
        StatusCode::CREATED,
        Json(StoredFile {
            url: format!("/files/{path}"),
            bucket,
            path,
            size: file.size,
            content_type: file.content_type,
        }),
    ))
}

// --- chat ---

/// Echoes the message back. With `stream: true` the reply is sent as plain
/// text, one character per body frame.
async fn chat(_auth: AuthUser, Json(input): Json<ChatInput>) -> Result<Response, ApiError> {
    if input.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }
    let reply = format!("Echo: {}", input.message);
    if !input.stream {
        let conversation_id = input.conversation_id.unwrap_or_else(new_id);
        return Ok(Json(ChatReply {
            reply,
            conversation_id,
        })
        .into_response());
    }
    let frames: Vec<Result<String, Infallible>> = reply.chars().map(|c| Ok(c.to_string())).collect();
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(futures::stream::iter(frames)),
    )
        .into_response())
}

// --- subscription ---

async fn subscription(auth: AuthUser) -> Json<Subscription> {
    Json(Subscription {
        tier: auth.user.tier,
        status: "active".to_string(),
        current_period_end: None,
    })
}

async fn usage(State(db): State<Db>, auth: AuthUser) -> Json<Value> {
    let store = db.read().await;
    let usage: serde_json::Map<String, Value> = store
        .usage(&auth.user)
        .into_iter()
        .map(|(name, quota)| (name.to_string(), json!(quota)))
        .collect();
    Json(json!({ "tier": auth.user.tier, "usage": usage }))
}

// --- ocr (integration service) ---

async fn ocr_process(
    State(db): State<Db>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<Json<OcrOutput>, ApiError> {
    let (file, fields) = read_form(multipart).await?;
    let file = file.ok_or_else(|| ApiError::bad_request("file is required"))?;

    let mut store = db.write().await;
    let quota = store
        .usage(&auth.user)
        .into_iter()
        .find(|(name, _)| *name == "ocr")
        .map(|(_, quota)| quota);
    if let Some(Quota { used, limit: Some(limit) }) = quota {
        if used >= limit {
            return Err(ApiError::quota_exceeded("ocr", limit));
        }
    }
    *store.ocr_runs.entry(auth.user.id).or_default() += 1;

    let language = fields.get("language").map_or("en", String::as_str);
    let structured = (fields.get("extract_structure").map(String::as_str) == Some("true")).then(|| {
        json!({ "fileName": file.file_name, "language": language, "lines": 1 })
    });
    Ok(Json(OcrOutput {
        text: format!("Recognized {} bytes from {}", file.size, file.file_name),
        confidence: 0.98,
        structured,
    }))
}
