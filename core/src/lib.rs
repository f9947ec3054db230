//! Client core for the Notaku backend.
//!
//! # Overview
//! Three request engines share one session object, [`ApiClient`]:
//!
//! - buffered JSON requests ([`ApiClient::request`]),
//! - multipart uploads with progress ([`ApiClient::upload`]),
//! - incremental text reads ([`ApiClient::stream`], [`ApiClient::open_stream`]).
//!
//! Resource facades ([`ApiClient::notes`], [`ApiClient::auth`], ...) bind
//! paths and types on top of the engines.
//!
//! # Design
//! - Request construction and response parsing are pure; the network
//!   round-trip is delegated to a [`Transport`] so the core is testable
//!   without sockets. [`ReqwestTransport`] is the default implementation.
//! - The bearer credential lives in a [`TokenStore`] backed by a pluggable
//!   [`KeyValueStore`]. A 401 from any engine expires it and emits a
//!   [`SessionEvent`] instead of navigating anywhere.
//! - Every failure is a [`ClientError`].
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod facades;
pub mod http;
pub mod query;
pub mod storage;
pub mod stream;
pub mod token_store;
pub mod transport;
pub mod types;
pub mod upload;

pub use client::ApiClient;
pub use config::{ClientConfig, ConfigError, Service, StorageKeys};
pub use descriptor::{RequestBody, RequestDescriptor, ResponseBody};
pub use error::{ClientError, ErrorBody, ErrorKind};
pub use facades::{
    AuthApi, ChatApi, FilesApi, NotesApi, OcrApi, ReceiptsApi, SubscriptionApi, SystemApi,
    DEFAULT_OCR_TIMEOUT,
};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use query::{build_url, QueryParams, QueryValue};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use stream::{StreamSession, Utf8ChunkDecoder};
pub use token_store::{InvalidationReason, SessionEvent, TokenStore};
#[cfg(feature = "reqwest")]
pub use transport::ReqwestTransport;
pub use transport::{
    ByteStream, ProgressSink, StreamingResponse, Transport, TransportCapabilities, TransportError,
};
pub use upload::{MultipartForm, ProgressCallback, UploadFile, UploadProgress, UploadRequest};

pub use tokio_util::sync::CancellationToken;
