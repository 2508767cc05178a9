use crate::config::{Config, DETAIL_ID_PLACEHOLDER};
use crate::feed::html::content_block;
use crate::source::Book;
use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Layout of the upstream `uptime` field.
pub const UPTIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A book whose update time could not be read. Only that book is dropped.
#[derive(Debug, Error)]
#[error("Invalid update time {value:?} for book {enid}: {source}")]
pub struct ParseError {
    pub enid: String,
    pub value: String,
    #[source]
    pub source: chrono::ParseError,
}

/// Fixed feed-level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMeta {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Detail page URL containing `{id}`.
    pub detail_url_template: String,
}

impl FeedMeta {
    pub fn from_config(config: &Config) -> Self {
        Self {
            title: config.feed_title.clone(),
            link: config.feed_link.clone(),
            description: config.feed_description.clone(),
            detail_url_template: config.detail_url_template.clone(),
        }
    }

    /// Detail page for one book; the id is percent-encoded.
    pub fn detail_link(&self, id: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
        self.detail_url_template
            .replace(DETAIL_ID_PLACEHOLDER, &encoded)
    }
}

impl Default for FeedMeta {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub content: String,
    pub author: String,
    pub created: DateTime<Utc>,
    pub description: String,
}

impl FeedItem {
    pub fn from_book(book: &Book, meta: &FeedMeta) -> Result<Self, ParseError> {
        let created = parse_uptime(&book.uptime).map_err(|source| ParseError {
            enid: book.enid.clone(),
            value: book.uptime.clone(),
            source,
        })?;

        Ok(Self {
            id: book.enid.clone(),
            title: book.title.clone(),
            link: meta.detail_link(&book.enid),
            content: content_block(book),
            author: book.author.clone(),
            created,
            description: book.other_share_summary.clone(),
        })
    }
}

/// The feed as it will be serialized: metadata plus items in upstream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    pub meta: FeedMeta,
    /// Set once at process start.
    pub created: DateTime<Utc>,
    /// Set on every render.
    pub updated: DateTime<Utc>,
    pub items: Vec<FeedItem>,
    /// Books dropped because their update time did not parse.
    pub skipped: usize,
}

impl FeedDocument {
    pub fn from_books(
        meta: FeedMeta,
        books: &[Book],
        created: DateTime<Utc>,
        updated: DateTime<Utc>,
    ) -> Self {
        let mut items = Vec::with_capacity(books.len());
        let mut skipped = 0;

        for book in books {
            match FeedItem::from_book(book, &meta) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!(enid = %e.enid, error = %e, "Skipping book with unparseable update time");
                    skipped += 1;
                }
            }
        }

        Self {
            meta,
            created,
            updated,
            items,
            skipped,
        }
    }
}

/// Update times carry no zone and are read as UTC.
pub fn parse_uptime(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, UPTIME_FORMAT).map(|naive| naive.and_utc())
}
