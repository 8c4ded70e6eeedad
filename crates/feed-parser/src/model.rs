use chrono::{DateTime, Utc};

/// Dialect a document was recognised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    /// RSS 0.9x / 2.0 (`<rss><channel><item>`).
    Rss,
    /// RSS 1.0 (`<rdf:RDF><item>`).
    Rdf,
    /// Atom 1.0 (`<feed><entry>`).
    Atom,
}

/// A parsed feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub kind: FeedKind,
    /// Channel / feed title, empty when the document has none.
    pub title: String,
    /// Items in document order.
    pub items: Vec<FeedItem>,
}

/// A single entry of a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    /// `guid` / `id` / `rdf:about`, or the link when the document carries none.
    pub guid: String,
    /// Publication time when the item declares a parseable one.
    pub published: Option<DateTime<Utc>>,
}

impl FeedItem {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        guid: impl Into<String>,
        published: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            guid: guid.into(),
            published,
        }
    }
}

impl Feed {
    /// Whether every item carries a publication time.
    ///
    /// Returns `false` for an empty feed.
    pub fn fully_timestamped(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|item| item.published.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fully_timestamped() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut feed = Feed {
            kind: FeedKind::Rss,
            title: String::new(),
            items: vec![],
        };
        assert!(!feed.fully_timestamped());

        feed.items.push(FeedItem::new("a", "l", "g", Some(ts)));
        assert!(feed.fully_timestamped());

        feed.items.push(FeedItem::new("b", "l2", "g2", None));
        assert!(!feed.fully_timestamped());
    }
}
