//! Podcast feed handling: retrieval, parsing, filtering and rebuilding.
//!
//! The pipeline for one feed runs leaf-first through these submodules:
//!
//! - [`fetcher`] - HTTP download of the source feed to a local file
//! - [`parser`] - XML into a fully defaulted [`ParsedFeed`] using `quick-xml`
//! - [`filter`] - keyword [`Rules`] deciding which episodes are retained
//! - [`builder`] - a fresh document from the channel and retained episodes
//! - [`serializer`] - the document as indented, UTF-8 XML text
//!
//! # Example
//!
//! ```
//! use podsieve::feed::{build, parse_feed, render, retain, Rules};
//!
//! let xml = br#"<rss version="2.0"><channel><title>Show</title>
//!   <item><title>Ep1: Politics</title></item>
//!   <item><title>Ep2: Comedy</title></item>
//! </channel></rss>"#;
//!
//! let feed = parse_feed(xml).unwrap();
//! let rules = Rules {
//!     exclude_title: vec!["politics".to_string()],
//!     ..Rules::default()
//! };
//! let kept = retain(feed.episodes, &rules);
//! let document = build(&feed.channel, &kept, &feed.extension_namespace);
//! let output = render(&document.root).unwrap();
//! assert!(output.contains("<title>Ep2: Comedy</title>"));
//! ```

pub mod builder;
pub mod fetcher;
pub mod filter;
pub mod model;
pub mod parser;
pub mod serializer;

pub use builder::{
    build, build_at, normalize_explicit, resolve_identifier, ArtworkSource, ArtworkTally,
    SynthesizedDocument, DATE_FORMAT,
};
pub use fetcher::{fetch_to_file, FetchError, FetchPolicy};
pub use filter::{retain, Rules};
pub use model::{
    Category, Channel, Enclosure, Episode, Owner, ParsedFeed, DEFAULT_EXTENSION_NAMESPACE,
    PLACEHOLDER_ARTWORK,
};
pub use parser::{parse_feed, ParseError};
pub use serializer::{render, Element};
