use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Request / Response Shapes
// ============================================================================

/// Body of the catalog list request.
#[derive(Debug, Clone, Serialize)]
pub struct ListRequest {
    pub count: u32,
    pub max_id: u64,
    pub sort: &'static str,
    pub since_id: u64,
}

impl ListRequest {
    /// Newest `count` entries, sorted by update time.
    pub fn newest(count: u32) -> Self {
        Self {
            count,
            max_id: 0,
            sort: "time",
            since_id: 0,
        }
    }
}

/// `{"c": {"list": [...]}}`
///
/// List elements stay as raw JSON so that a single drifted record can be
/// dropped without failing the whole page.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub c: EnvelopeBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EnvelopeBody {
    pub list: Vec<serde_json::Value>,
}

// ============================================================================
// Book
// ============================================================================

/// One catalog entry as delivered by the upstream API.
///
/// Text fields are opaque; absent or `null` values decode to an empty string.
/// `enid` is required, must be non-blank, and is the stable identifier of the
/// book.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Book {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub author: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub cover: String,
    #[serde(rename = "operating_title", default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub author_info: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub book_intro: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub publish_time: String,
    /// Last update, `YYYY-MM-DD HH:MM:SS`.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub uptime: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub other_share_summary: String,
    #[serde(deserialize_with = "non_blank")]
    pub enid: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_blank<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    if value.trim().is_empty() {
        return Err(D::Error::custom("enid is blank"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(ListRequest::newest(50)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"count": 50, "max_id": 0, "sort": "time", "since_id": 0})
        );
    }

    #[test]
    fn test_book_field_mapping() {
        let book: Book = serde_json::from_value(serde_json::json!({
            "author": "Author1",
            "cover": "http://example.com/cover1.jpg",
            "operating_title": "Title1",
            "author_info": "Author Info 1",
            "book_intro": "Book Intro 1",
            "publish_time": "2023-01-01",
            "uptime": "2023-01-01 00:00:00",
            "other_share_summary": "Summary 1",
            "enid": "enid1",
            "price": 1999
        }))
        .unwrap();

        assert_eq!(book.title, "Title1");
        assert_eq!(book.author_info, "Author Info 1");
        assert_eq!(book.other_share_summary, "Summary 1");
        assert_eq!(book.enid, "enid1");
    }

    #[test]
    fn test_missing_and_null_text_fields_are_empty() {
        let book: Book =
            serde_json::from_value(serde_json::json!({"enid": "x", "author": null})).unwrap();
        assert_eq!(book.author, "");
        assert_eq!(book.cover, "");
        assert_eq!(book.uptime, "");
    }

    #[test]
    fn test_missing_enid_rejected() {
        let result: Result<Book, _> = serde_json::from_value(serde_json::json!({"author": "a"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_blank_enid_rejected() {
        for enid in ["", "   "] {
            let result: Result<Book, _> =
                serde_json::from_value(serde_json::json!({"author": "a", "enid": enid}));
            assert!(result.is_err(), "enid {enid:?} accepted");
        }
    }
}
