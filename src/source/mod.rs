//! Upstream catalog access.
//!
//! - [`client`] - `POST`s the list request and streams the response with a size cap
//! - [`types`] - request body, response envelope and the [`Book`] record
//!
//! Decoding is per record: a drifted entry is logged and dropped instead of
//! failing the whole page.

mod client;
mod types;

pub use client::{decode_books, BookSource, SourceClient, SourceError};
pub use types::{Book, ListRequest};
