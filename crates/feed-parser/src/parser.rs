//! Streaming feed parser built on `quick-xml`.
//!
//! The parser walks the document once, keeping a stack of open element names.
//! Only direct children of an item/entry are interpreted, so markup nested
//! inside descriptions never leaks into titles or links.
//!
//! Text is decoded with the charset from the XML declaration (or BOM), so
//! GBK or ISO-8859-1 feeds come out as proper UTF-8.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use quick_xml::encoding::Decoder;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::debug;

use crate::date::parse_date;
use crate::error::ParseError;
use crate::model::{Feed, FeedItem, FeedKind};

/// Parse a raw feed document.
///
/// Items are returned in document order; no sorting is applied.
pub fn parse(data: &[u8]) -> Result<Feed, ParseError> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::Empty);
    }

    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut state = ParseState::default();

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ParseError::xml(position, e))?;
        // Switches once the declaration has been read.
        let decoder = reader.decoder();

        match event {
            Event::Start(e) => state.start(&e, decoder)?,
            Event::Empty(e) => {
                state.start(&e, decoder)?;
                state.end();
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map(Cow::into_owned)
                    // Undeclared HTML entities (&nbsp; and friends) are common; keep the raw text.
                    .unwrap_or_else(|_| decode(decoder, &t));
                state.text(&text);
            }
            Event::CData(c) => state.text(&decode(decoder, &c)),
            Event::End(_) => state.end(),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    state.finish()
}

#[derive(Default)]
struct ParseState {
    kind: Option<FeedKind>,
    stack: Vec<String>,
    text: String,
    title: String,
    items: Vec<FeedItem>,
    current: Option<PendingItem>,
    item_depth: usize,
    root_closed: bool,
}

impl ParseState {
    fn start(&mut self, e: &BytesStart<'_>, decoder: Decoder) -> Result<(), ParseError> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        self.text.clear();

        let Some(kind) = self.kind else {
            let kind = match name.as_str() {
                "rss" => FeedKind::Rss,
                "RDF" => FeedKind::Rdf,
                "feed" => FeedKind::Atom,
                other => return Err(ParseError::UnknownFormat(other.to_string())),
            };
            self.kind = Some(kind);
            self.stack.push(name);
            return Ok(());
        };

        self.stack.push(name.clone());

        if self.current.is_none() && is_item_element(kind, &name) {
            let mut item = PendingItem::default();
            if kind == FeedKind::Rdf
                && let Some(about) = attribute(e, b"about", decoder)
            {
                item.guid = about;
            }
            self.current = Some(item);
            self.item_depth = self.stack.len();
            return Ok(());
        }

        // Atom carries the item link as an attribute, not as text.
        if kind == FeedKind::Atom
            && name == "link"
            && self.stack.len() == self.item_depth + 1
            && let Some(item) = self.current.as_mut()
            && item.link.is_empty()
        {
            let rel = attribute(e, b"rel", decoder);
            if rel.as_deref().is_none_or(|rel| rel == "alternate")
                && let Some(href) = attribute(e, b"href", decoder)
            {
                item.link = href;
            }
        }

        Ok(())
    }

    fn text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn end(&mut self) {
        let Some(name) = self.stack.pop() else {
            return;
        };
        let text = std::mem::take(&mut self.text);
        let Some(kind) = self.kind else {
            return;
        };
        let depth = self.stack.len();

        if self.current.is_some() && depth + 1 == self.item_depth {
            if let Some(item) = self.current.take() {
                self.items.push(item.finish());
            }
        } else if depth == self.item_depth
            && let Some(item) = self.current.as_mut()
        {
            item.assign(kind, &name, text.trim());
        } else if self.current.is_none()
            && name == "title"
            && self.title.is_empty()
            && matches!(self.stack.last().map(String::as_str), Some("channel" | "feed"))
        {
            self.title = text.trim().to_string();
        }

        if self.stack.is_empty() {
            self.root_closed = true;
        }
    }

    fn finish(self) -> Result<Feed, ParseError> {
        let kind = self.kind.ok_or(ParseError::Empty)?;
        if !self.root_closed {
            return Err(ParseError::Truncated);
        }
        Ok(Feed {
            kind,
            title: self.title,
            items: self.items,
        })
    }
}

#[derive(Default)]
struct PendingItem {
    title: String,
    link: String,
    guid: String,
    published: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
}

impl PendingItem {
    fn assign(&mut self, kind: FeedKind, field: &str, text: &str) {
        match (kind, field) {
            (_, "title") => self.title = text.to_string(),
            (FeedKind::Rss | FeedKind::Rdf, "link") => self.link = text.to_string(),
            (FeedKind::Rss, "guid") | (FeedKind::Atom, "id") => {
                if !text.is_empty() {
                    self.guid = text.to_string();
                }
            }
            (FeedKind::Rss, "pubDate")
            | (_, "date")
            | (FeedKind::Atom, "published")
            | (FeedKind::Atom, "issued") => {
                let parsed = parse_date(text);
                if parsed.is_none() && !text.is_empty() {
                    debug!(value = %text, "Unparseable publication date");
                }
                self.published = parsed.or(self.published);
            }
            (FeedKind::Atom, "updated") | (FeedKind::Atom, "modified") => {
                self.updated = parse_date(text);
            }
            _ => {}
        }
    }

    fn finish(self) -> FeedItem {
        let guid = if self.guid.is_empty() {
            self.link.clone()
        } else {
            self.guid
        };
        FeedItem {
            title: self.title,
            link: self.link,
            guid,
            published: self.published.or(self.updated),
        }
    }
}

fn is_item_element(kind: FeedKind, name: &str) -> bool {
    match kind {
        FeedKind::Rss | FeedKind::Rdf => name == "item",
        FeedKind::Atom => name == "entry",
    }
}

fn decode(decoder: Decoder, bytes: &[u8]) -> String {
    decoder
        .decode(bytes)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}

/// Look up an attribute by local name; malformed attributes are skipped.
fn attribute(e: &BytesStart<'_>, key: &[u8], decoder: Decoder) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.local_name().as_ref() != key {
            return None;
        }
        let raw = decode(decoder, &attr.value);
        let value = match unescape(&raw) {
            Ok(value) => value.into_owned(),
            Err(_) => raw,
        };
        Some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Example Channel</title>
    <link>https://example.com/</link>
    <image><title>Logo</title><url>https://example.com/logo.png</url></image>
    <item>
      <title><![CDATA[Episode <2>]]></title>
      <link>https://example.com/2</link>
      <guid isPermaLink="false">ep-2</guid>
      <pubDate>Tue, 03 Jan 2006 15:04:05 +0000</pubDate>
      <description><![CDATA[<p><title>not a title</title></p>]]></description>
    </item>
    <item>
      <title>Tom &amp; Jerry</title>
      <link>https://example.com/1</link>
      <dc:date>2006-01-02T15:04:05Z</dc:date>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <link href="https://example.org/" rel="self"/>
  <entry>
    <title>First</title>
    <link rel="enclosure" href="https://example.org/file.torrent"/>
    <link href="https://example.org/first"/>
    <id>urn:uuid:1</id>
    <updated>2024-05-01T10:00:00Z</updated>
  </entry>
  <entry>
    <title>Second</title>
    <link rel="alternate" href="https://example.org/second"></link>
    <id>urn:uuid:2</id>
    <published>2024-05-02T10:00:00+02:00</published>
    <updated>2024-05-03T10:00:00Z</updated>
  </entry>
</feed>"#;

    const RDF: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/"
         xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://example.net/">
    <title>RDF Channel</title>
  </channel>
  <item rdf:about="https://example.net/a">
    <title>A</title>
    <link>https://example.net/a</link>
    <dc:date>2023-07-01T00:00:00Z</dc:date>
  </item>
  <item rdf:about="https://example.net/b">
    <title>B</title>
    <link>https://example.net/b</link>
  </item>
</rdf:RDF>"#;

    #[test]
    fn test_parse_rss() {
        let feed = parse(RSS.as_bytes()).unwrap();
        assert_eq!(feed.kind, FeedKind::Rss);
        assert_eq!(feed.title, "Example Channel");
        assert_eq!(feed.items.len(), 2);

        let first = &feed.items[0];
        assert_eq!(first.title, "Episode <2>");
        assert_eq!(first.link, "https://example.com/2");
        assert_eq!(first.guid, "ep-2");
        assert_eq!(
            first.published,
            Some(Utc.with_ymd_and_hms(2006, 1, 3, 15, 4, 5).unwrap())
        );

        let second = &feed.items[1];
        assert_eq!(second.title, "Tom & Jerry");
        // No guid: the link stands in.
        assert_eq!(second.guid, "https://example.com/1");
        assert_eq!(
            second.published,
            Some(Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap())
        );
        assert!(feed.fully_timestamped());
    }

    #[test]
    fn test_parse_atom() {
        let feed = parse(ATOM.as_bytes()).unwrap();
        assert_eq!(feed.kind, FeedKind::Atom);
        assert_eq!(feed.title, "Atom Feed");
        assert_eq!(feed.items.len(), 2);

        let first = &feed.items[0];
        assert_eq!(first.link, "https://example.org/first");
        assert_eq!(first.guid, "urn:uuid:1");
        // Falls back to <updated> when <published> is absent.
        assert_eq!(
            first.published,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );

        let second = &feed.items[1];
        assert_eq!(second.link, "https://example.org/second");
        assert_eq!(
            second.published,
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_rdf() {
        let feed = parse(RDF.as_bytes()).unwrap();
        assert_eq!(feed.kind, FeedKind::Rdf);
        assert_eq!(feed.title, "RDF Channel");
        assert_eq!(feed.items.len(), 2);
        assert_eq!(feed.items[0].guid, "https://example.net/a");
        assert!(feed.items[0].published.is_some());
        assert!(feed.items[1].published.is_none());
        assert!(!feed.fully_timestamped());
    }

    #[test]
    fn test_parse_undeclared_entity_is_kept_raw() {
        let doc = r#"<rss><channel><item><title>a&nbsp;b</title><guid>g</guid></item></channel></rss>"#;
        let feed = parse(doc.as_bytes()).unwrap();
        assert_eq!(feed.items[0].title, "a&nbsp;b");
    }

    #[test]
    fn test_parse_declared_charset() {
        let latin1 = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\
<rss><channel><title>Caf\xe9</title><item><title>Cr\xe8me br\xfbl\xe9e</title>\
<guid>g</guid></item></channel></rss>";
        let feed = parse(latin1).unwrap();
        assert_eq!(feed.title, "Caf\u{e9}");
        assert_eq!(feed.items[0].title, "Cr\u{e8}me br\u{fb}l\u{e9}e");

        // "\u{4f60}\u{597d}" in GBK.
        let gbk = b"<?xml version=\"1.0\" encoding=\"GBK\"?>\
<rss><channel><item><title>\xc4\xe3\xba\xc3</title><link>https://e.x/\xc4\xe3</link>\
<guid>g</guid></item></channel></rss>";
        let feed = parse(gbk).unwrap();
        assert_eq!(feed.items[0].title, "\u{4f60}\u{597d}");
        assert_eq!(feed.items[0].link, "https://e.x/\u{4f60}");
    }

    #[test]
    fn test_parse_empty_channel() {
        let feed = parse(b"<rss><channel><title>t</title></channel></rss>").unwrap();
        assert!(feed.items.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse(b"").unwrap_err(), ParseError::Empty);
        assert_eq!(parse(b"  \n ").unwrap_err(), ParseError::Empty);
        assert_eq!(
            parse(b"<html><body/></html>").unwrap_err(),
            ParseError::UnknownFormat("html".to_string())
        );
        assert!(matches!(
            parse(b"<rss><channel></item></rss>").unwrap_err(),
            ParseError::Xml { .. }
        ));
        assert!(parse(b"<rss><channel><item>").is_err());
    }
}
