// Syndication feed parsing (RSS 2.0, RSS 1.0 / RDF, Atom)
pub mod date;
pub mod error;
pub mod model;
pub mod parser;

pub use error::ParseError;
pub use model::{Feed, FeedItem, FeedKind};
pub use parser::parse;
