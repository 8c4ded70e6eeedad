use thiserror::Error;

/// Errors produced while turning a document into a [`crate::Feed`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("document is empty")]
    Empty,

    #[error("malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("unsupported root element <{0}>, expected <rss>, <rdf:RDF> or <feed>")]
    UnknownFormat(String),

    #[error("document ended before the root element was closed")]
    Truncated,
}

impl ParseError {
    pub(crate) fn xml(position: u64, err: impl std::fmt::Display) -> Self {
        Self::Xml {
            position,
            message: err.to_string(),
        }
    }
}
