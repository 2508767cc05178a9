//! Atom feed rendering for the book list.
//!
//! - [`document`] - feed model built from books; drops books whose update time does not parse
//! - [`html`] - the per-entry HTML content block
//! - [`atom`] - serialization through `atom_syndication`

mod atom;
mod document;
mod html;

pub use atom::{to_atom_string, FeedRenderer, RenderError, RenderedFeed};
pub use document::{parse_uptime, FeedDocument, FeedItem, FeedMeta, ParseError, UPTIME_FORMAT};
