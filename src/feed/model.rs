//! In-memory representation of a parsed podcast feed.
//!
//! These types are plain data. Every textual field is a `String` that is
//! empty when the source lacked it, so downstream code never has to check
//! for presence. Only genuinely structured, optional data (owner, artwork,
//! publication timestamp) uses `Option`.

use chrono::{DateTime, Utc};

/// Artwork used when neither the episode nor the channel provides one.
pub const PLACEHOLDER_ARTWORK: &str = "https://placehold.co/600x600/cccccc/333333?text=No+Artwork";

/// Namespace URI assumed for podcast extension tags when the source feed
/// does not declare one.
pub const DEFAULT_EXTENSION_NAMESPACE: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";

/// A channel together with its episodes and the extension namespace the
/// source used.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub channel: Channel,
    /// Episodes in source order.
    pub episodes: Vec<Episode>,
    /// Extension namespace URI, reused verbatim on output.
    pub extension_namespace: String,
}

/// Feed-level metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Channel {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    pub author: String,
    pub summary: String,
    /// Raw explicit flag as found in the source; normalized at build time.
    pub explicit: String,
    pub owner: Option<Owner>,
    pub categories: Vec<Category>,
    /// URL from the standard `<image><url>` block.
    pub image_url: Option<String>,
    /// URL from the extension `image[@href]` tag.
    pub extension_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Owner {
    pub name: String,
    pub email: String,
}

/// An extension category with optional nested subcategories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Category {
    pub term: String,
    pub subcategories: Vec<Category>,
}

/// One podcast installment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Episode {
    pub title: String,
    pub description: String,
    pub link: String,
    /// Explicit `<id>` element, rarely present in RSS.
    pub id: String,
    pub guid: String,
    /// `pubDate` exactly as written in the source.
    pub published_raw: String,
    /// `None` when the source had no date or it could not be parsed.
    pub published: Option<DateTime<Utc>>,
    /// Every enclosure in source order. Only the first is ever emitted.
    pub enclosures: Vec<Enclosure>,
    pub author: String,
    pub summary: String,
    pub duration: String,
    pub explicit: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    /// Length in bytes, kept as the source string.
    pub length: String,
    pub mime_type: String,
}
