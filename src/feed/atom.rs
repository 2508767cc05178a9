//! Atom 1.0 serialization of a [`FeedDocument`].

use crate::feed::document::{FeedDocument, FeedItem, FeedMeta};
use crate::source::Book;
use atom_syndication::{
    ContentBuilder, Entry, EntryBuilder, Feed, FeedBuilder, GeneratorBuilder, Link, LinkBuilder,
    PersonBuilder, Text,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to serialize Atom feed: {0}")]
    Xml(#[from] atom_syndication::Error),

    #[error("Serialized Atom feed is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Output of one render.
#[derive(Debug, Clone)]
pub struct RenderedFeed {
    pub xml: String,
    pub entries: usize,
    pub skipped: usize,
}

/// Turns book lists into Atom documents with fixed feed metadata.
#[derive(Debug, Clone, Default)]
pub struct FeedRenderer {
    meta: FeedMeta,
}

impl FeedRenderer {
    pub fn new(meta: FeedMeta) -> Self {
        Self { meta }
    }

    /// Render `books`, stamping the feed as updated now.
    pub fn render(
        &self,
        books: &[Book],
        created_at: DateTime<Utc>,
    ) -> Result<RenderedFeed, RenderError> {
        self.render_at(books, created_at, Utc::now())
    }

    /// Deterministic form of [`FeedRenderer::render`].
    ///
    /// Books whose update time does not parse are logged and left out; they
    /// never fail the render.
    pub fn render_at(
        &self,
        books: &[Book],
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<RenderedFeed, RenderError> {
        let document = FeedDocument::from_books(self.meta.clone(), books, created_at, updated_at);
        let entries = document.items.len();
        let skipped = document.skipped;
        let xml = to_atom_string(&document)?;

        Ok(RenderedFeed {
            xml,
            entries,
            skipped,
        })
    }
}

pub fn to_atom_string(document: &FeedDocument) -> Result<String, RenderError> {
    let bytes = to_atom_feed(document).write_to(Vec::new())?;
    Ok(String::from_utf8(bytes)?)
}

fn to_atom_feed(document: &FeedDocument) -> Feed {
    let meta = &document.meta;

    let link: Link = LinkBuilder::default()
        .href(meta.link.clone())
        .rel("alternate".to_string())
        .build();

    let entries: Vec<Entry> = document.items.iter().map(item_to_entry).collect();

    FeedBuilder::default()
        .title(Text::plain(meta.title.clone()))
        .id(meta.link.clone())
        .updated(document.updated.fixed_offset())
        .links(vec![link])
        .subtitle(Some(Text::plain(meta.description.clone())))
        .generator(Some(
            GeneratorBuilder::default()
                .value("bookfeed")
                .version(Some(env!("CARGO_PKG_VERSION").to_string()))
                .build(),
        ))
        .entries(entries)
        .build()
}

fn item_to_entry(item: &FeedItem) -> Entry {
    let created = item.created.fixed_offset();

    let link: Link = LinkBuilder::default()
        .href(item.link.clone())
        .rel("alternate".to_string())
        .build();

    let content = ContentBuilder::default()
        .value(Some(item.content.clone()))
        .content_type(Some("html".to_string()))
        .build();

    EntryBuilder::default()
        .title(Text::plain(item.title.clone()))
        .id(item.id.clone())
        .updated(created)
        .published(Some(created))
        .authors(vec![PersonBuilder::default().name(item.author.clone()).build()])
        .links(vec![link])
        .summary(Some(Text::html(item.description.clone())))
        .content(Some(content))
        .build()
}
