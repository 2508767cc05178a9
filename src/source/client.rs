//! Catalog list client.
//!
//! One POST per refresh, body read with a size cap, then decoded record by
//! record so a single drifted entry never sinks the whole page.

use crate::source::types::{Book, Envelope, ListRequest};
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while fetching the catalog page.
///
/// `Network`, `Timeout`, `ResponseTooLarge` and `IncompleteResponse` mean the
/// upstream could not be read in full; `Decode` means it answered with something that is not the
/// expected envelope.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Connection closed before Content-Length bytes arrived
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Body was not `{"c": {"list": [...]}}`
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SourceError::Timeout
        } else {
            SourceError::Network(e)
        }
    }
}

/// Anything that can produce the current list of books.
///
/// The refresh loop is generic over this so it can be driven without a real
/// upstream.
pub trait BookSource: Send + Sync + 'static {
    fn fetch_books(&self) -> impl Future<Output = Result<Vec<Book>, SourceError>> + Send;
}

/// HTTP client for the catalog list endpoint.
#[derive(Debug, Clone)]
pub struct SourceClient {
    client: reqwest::Client,
    endpoint: String,
    page_size: u32,
}

impl SourceClient {
    pub fn new(
        endpoint: impl Into<String>,
        page_size: u32,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .user_agent(concat!("bookfeed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(SourceError::Network)?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            page_size,
        })
    }

    /// Fetch one page of the newest books.
    ///
    /// The response status is not inspected: an error page that is not the
    /// expected JSON envelope surfaces as [`SourceError::Decode`]. Records that
    /// fail to decode individually are logged and dropped.
    pub async fn fetch_books(&self) -> Result<Vec<Book>, SourceError> {
        let body = serde_json::to_vec(&ListRequest::newest(self.page_size))?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "*/*")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                endpoint = %self.endpoint,
                status = %status,
                "Upstream answered with non-success status"
            );
        }

        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        let books = decode_books(&bytes)?;
        tracing::debug!(endpoint = %self.endpoint, books = books.len(), "Fetched book list");
        Ok(books)
    }
}

impl BookSource for SourceClient {
    async fn fetch_books(&self) -> Result<Vec<Book>, SourceError> {
        SourceClient::fetch_books(self).await
    }
}

/// Decode the envelope, keeping every record that decodes on its own.
pub fn decode_books(bytes: &[u8]) -> Result<Vec<Book>, SourceError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;

    let total = envelope.c.list.len();
    let books: Vec<Book> = envelope
        .c
        .list
        .into_iter()
        .enumerate()
        .filter_map(|(index, raw)| match serde_json::from_value::<Book>(raw) {
            Ok(book) => Some(book),
            Err(e) => {
                tracing::warn!(index = index, error = %e, "Skipping undecodable book record");
                None
            }
        })
        .collect();

    if books.len() < total {
        tracing::warn!(
            kept = books.len(),
            dropped = total - books.len(),
            "Some book records were dropped while decoding"
        );
    }

    Ok(books)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, SourceError> {
    let expected_length = response.content_length();
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(SourceError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(SourceError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    check_complete(expected_length, bytes.len())?;
    Ok(bytes)
}

/// A body shorter than its Content-Length is a transport failure, not a
/// malformed envelope.
fn check_complete(expected: Option<u64>, received: usize) -> Result<(), SourceError> {
    match expected {
        Some(expected) if (received as u64) < expected => {
            Err(SourceError::IncompleteResponse { expected, received })
        }
        _ => Ok(()),
    }
}
