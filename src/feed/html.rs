//! HTML content block for a feed entry.

use crate::source::Book;
use std::borrow::Cow;

/// Escape HTML special characters in text and attribute values.
///
/// Uses `Cow` to avoid allocation when no escaping is needed.
pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['<', '>', '&', '"', '\'']) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Cover image followed by the labelled summary, intro, author bio and
/// publish time.
pub fn content_block(book: &Book) -> String {
    format!(
        "<img src='{}'/><br/>主编推荐语: {}<br/><br/>内容简介: {}<br/><br/>作者介绍: {}<br/><br/>出版时间: {}",
        escape(&book.cover),
        escape(&book.other_share_summary),
        escape(&book.book_intro),
        escape(&book.author_info),
        escape(&book.publish_time),
    )
}
