//! Incremental response reads.
//!
//! A `StreamSession` owns an open body reader and a UTF-8 decoder that
//! carries partial multi-byte sequences across chunk boundaries. Sessions
//! are single-pass: once the body is exhausted, errors or is cancelled, the
//! session is done. Dropping a session closes the underlying reader.

use bytes::Bytes;
use encoding_rs::{CoderResult, Decoder, UTF_8};
use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::client::{with_cancel, ApiClient};
use crate::descriptor::RequestDescriptor;
use crate::error::ClientError;
use crate::transport::{ByteStream, StreamingResponse, TransportError};

/// Streaming UTF-8 decoder backed by `encoding_rs`. Partial multi-byte
/// sequences are carried across calls; invalid bytes become U+FFFD.
pub struct Utf8ChunkDecoder {
    inner: Decoder,
}

impl Default for Utf8ChunkDecoder {
    fn default() -> Self {
        Self {
            inner: UTF_8.new_decoder_with_bom_removal(),
        }
    }
}

impl std::fmt::Debug for Utf8ChunkDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Utf8ChunkDecoder").finish_non_exhaustive()
    }
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, holding back a trailing incomplete sequence.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut out = String::new();
        self.decode_into(chunk, &mut out, false);
        out
    }

    /// End of input. Returns `true` when a partial sequence was left over;
    /// those bytes are discarded and the decoder starts afresh.
    pub fn finish(&mut self) -> bool {
        let mut tail = String::new();
        self.decode_into(&[], &mut tail, true);
        self.inner = UTF_8.new_decoder_with_bom_removal();
        !tail.is_empty()
    }

    fn decode_into(&mut self, mut src: &[u8], out: &mut String, last: bool) {
        loop {
            let needed = self
                .inner
                .max_utf8_buffer_length(src.len())
                .unwrap_or(src.len());
            out.reserve(needed);
            let (result, read, _) = self.inner.decode_to_string(src, out, last);
            src = &src[read..];
            if let CoderResult::InputEmpty = result {
                return;
            }
        }
    }
}

pub struct StreamSession {
    status: u16,
    headers: Vec<(String, String)>,
    body: ByteStream,
    decoder: Utf8ChunkDecoder,
    done: bool,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("status", &self.status)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    fn new(response: StreamingResponse, cancel: Option<CancellationToken>) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
            decoder: Utf8ChunkDecoder::new(),
            done: false,
            cancel,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decoded text for the next received chunk, or `None` once the body is
    /// exhausted. Every received chunk yields exactly one piece, which may be
    /// empty when the chunk only held part of a multi-byte character. Bytes of
    /// a sequence still incomplete at end of body are dropped.
    pub async fn next_text(&mut self) -> Result<Option<String>, ClientError> {
        if self.done {
            return Ok(None);
        }
        let next = match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        self.done = true;
                        return Err(ClientError::cancelled());
                    }
                    item = self.body.next() => item,
                }
            }
            None => self.body.next().await,
        };
        match next {
            Some(Ok(chunk)) => Ok(Some(self.decoder.decode(&chunk))),
            Some(Err(e)) => {
                self.done = true;
                Err(e.into())
            }
            None => {
                self.done = true;
                if self.decoder.finish() {
                    tracing::debug!("body ended inside a multi-byte sequence; dropped");
                }
                Ok(None)
            }
        }
    }

    /// Drain the rest of the body into one string.
    pub async fn collect_text(mut self) -> Result<String, ClientError> {
        let mut text = String::new();
        while let Some(piece) = self.next_text().await? {
            text.push_str(&piece);
        }
        Ok(text)
    }
}

impl ApiClient {
    /// Issue `descriptor` and hand back the unread body.
    ///
    /// A non-2xx response is read in full and returned as a `ClientError`.
    /// Transports without the `streaming` capability are driven through a
    /// buffered send and yield the whole body as a single chunk.
    pub async fn open_stream(&self, descriptor: RequestDescriptor) -> Result<StreamSession, ClientError> {
        let cancel = descriptor.cancel.clone();
        let request = self.build_request(&descriptor);
        self.log_request(&request);

        let transport = self.transport().clone();
        let response = with_cancel(cancel.as_ref(), async move {
            if transport.capabilities().streaming {
                transport.send_streaming(request).await.map_err(ClientError::from)
            } else {
                let buffered = transport.send(request).await?;
                let chunks: Vec<Result<Bytes, TransportError>> = if buffered.body.is_empty() {
                    Vec::new()
                } else {
                    vec![Ok(buffered.body)]
                };
                Ok(StreamingResponse {
                    status: buffered.status,
                    status_text: buffered.status_text,
                    headers: buffered.headers,
                    body: stream::iter(chunks).boxed(),
                })
            }
        })
        .await?;

        self.observe(response.status, &response.status_text);
        if !(200..300).contains(&response.status) {
            let StreamingResponse {
                status,
                status_text,
                body,
                ..
            } = response;
            let bytes = with_cancel(cancel.as_ref(), read_all(body)).await?;
            return Err(ClientError::from_response(status, &status_text, &bytes));
        }
        Ok(StreamSession::new(response, cancel))
    }

    /// Stream the response of `descriptor` through callbacks.
    ///
    /// On a failed request only `on_error` runs. Otherwise `on_chunk` runs
    /// once per received chunk in arrival order, followed by exactly one of
    /// `on_complete` (body exhausted) or `on_error` (read failure or
    /// cancellation).
    pub async fn stream<C, D, E>(
        &self,
        descriptor: RequestDescriptor,
        mut on_chunk: C,
        on_complete: D,
        on_error: E,
    ) where
        C: FnMut(&str),
        D: FnOnce(),
        E: FnOnce(ClientError),
    {
        let mut session = match self.open_stream(descriptor).await {
            Ok(session) => session,
            Err(e) => return on_error(e),
        };
        loop {
            match session.next_text().await {
                Ok(Some(text)) => on_chunk(&text),
                Ok(None) => return on_complete(),
                Err(e) => return on_error(e),
            }
        }
    }
}

/// Best-effort read of an error body; a read failure yields what arrived.
async fn read_all(mut body: ByteStream) -> Result<Vec<u8>, ClientError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(e) => {
                tracing::debug!(error = %e, "error body truncated");
                break;
            }
        }
    }
    Ok(bytes)
}
