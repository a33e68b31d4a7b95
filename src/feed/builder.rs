//! Synthesis of a fresh feed document from a channel and its retained
//! episodes.
//!
//! Nothing here can fail: every field has a defined default, so any
//! [`Channel`]/[`Episode`] pair produced by the parser yields a complete
//! document.

use chrono::{DateTime, Utc};

use super::model::{Category, Channel, Episode, Owner, PLACEHOLDER_ARTWORK};
use super::serializer::Element;

/// RFC-822 style date format used for `pubDate` and `lastBuildDate`.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Prefix bound to the extension namespace in the output document.
pub const EXTENSION_PREFIX: &str = "itunes";

const DEFAULT_ENCLOSURE_LENGTH: &str = "0";
const DEFAULT_ENCLOSURE_TYPE: &str = "audio/mpeg";

/// Which fallback tier supplied a piece of artwork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtworkSource {
    /// The item's own artwork (the channel's `<image>` or extension image
    /// when describing the channel itself).
    Own,
    /// Inherited from the channel.
    Channel,
    /// Nothing was available; [`PLACEHOLDER_ARTWORK`] was used.
    Placeholder,
}

/// Per-tier counts of episode artwork resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArtworkTally {
    pub own: usize,
    pub channel: usize,
    pub placeholder: usize,
}

impl ArtworkTally {
    fn record(&mut self, source: ArtworkSource) {
        match source {
            ArtworkSource::Own => self.own += 1,
            ArtworkSource::Channel => self.channel += 1,
            ArtworkSource::Placeholder => self.placeholder += 1,
        }
    }
}

/// A rebuilt feed ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedDocument {
    /// The `<rss>` root element.
    pub root: Element,
    pub channel_artwork: ArtworkSource,
    pub episode_artwork: ArtworkTally,
}

/// The extension namespace, resolved once and carried through the build.
struct Extension<'a> {
    uri: &'a str,
}

impl Extension<'_> {
    fn tag(&self, local: &str) -> String {
        format!("{EXTENSION_PREFIX}:{local}")
    }

    fn text(&self, local: &str, text: impl Into<String>) -> Element {
        Element::text(self.tag(local), text)
    }
}

/// Builds a document stamped with the current time.
pub fn build(channel: &Channel, episodes: &[Episode], extension_namespace: &str) -> SynthesizedDocument {
    build_at(channel, episodes, extension_namespace, Utc::now())
}

/// Builds a document with an explicit `lastBuildDate`.
///
/// The output is fully determined by the arguments: channel fields first,
/// then one `<item>` per episode in the given order.
pub fn build_at(
    channel: &Channel,
    episodes: &[Episode],
    extension_namespace: &str,
    built_at: DateTime<Utc>,
) -> SynthesizedDocument {
    let ext = Extension {
        uri: extension_namespace,
    };

    let (channel_image, channel_artwork) = resolve_channel_artwork(channel);
    let mut channel_element = build_channel(channel, &ext, built_at, &channel_image);

    let mut episode_artwork = ArtworkTally::default();
    for episode in episodes {
        let (image, source) = resolve_episode_artwork(episode, &channel_image);
        episode_artwork.record(source);
        channel_element.push(build_item(episode, &ext, image));
    }

    tracing::debug!(
        items = episodes.len(),
        channel_artwork = ?channel_artwork,
        own = episode_artwork.own,
        inherited = episode_artwork.channel,
        placeholder = episode_artwork.placeholder,
        "Built feed document"
    );

    let root = Element::new("rss")
        .attr("version", "2.0")
        .attr(format!("xmlns:{EXTENSION_PREFIX}"), ext.uri)
        .child(channel_element);

    SynthesizedDocument {
        root,
        channel_artwork,
        episode_artwork,
    }
}

fn build_channel(
    channel: &Channel,
    ext: &Extension<'_>,
    built_at: DateTime<Utc>,
    image: &str,
) -> Element {
    let mut element = Element::new("channel")
        .child(Element::text("title", &channel.title))
        .child(Element::text("link", &channel.link))
        .child(Element::text("description", &channel.description))
        .child(Element::text("language", &channel.language))
        .child(Element::text(
            "lastBuildDate",
            built_at.format(DATE_FORMAT).to_string(),
        ))
        .child(ext.text("author", &channel.author))
        .child(ext.text(
            "summary",
            prefer_non_empty(&channel.summary, &channel.description),
        ));

    if let Some(owner) = &channel.owner {
        element.push(build_owner(owner, ext));
    }

    element.push(ext.text("explicit", normalize_explicit(&channel.explicit)));

    for category in &channel.categories {
        element.push(build_category(category, ext));
    }

    element
        .child(
            Element::new("image")
                .child(Element::text("url", image))
                .child(Element::text("title", &channel.title))
                .child(Element::text("link", &channel.link)),
        )
        .child(Element::new(ext.tag("image")).attr("href", image))
}

fn build_owner(owner: &Owner, ext: &Extension<'_>) -> Element {
    Element::new(ext.tag("owner"))
        .child(ext.text("name", &owner.name))
        .child(ext.text("email", &owner.email))
}

fn build_category(category: &Category, ext: &Extension<'_>) -> Element {
    let mut element = Element::new(ext.tag("category")).attr("text", &category.term);
    for sub in &category.subcategories {
        element.push(build_category(sub, ext));
    }
    element
}

fn build_item(episode: &Episode, ext: &Extension<'_>, image: &str) -> Element {
    let description = prefer_non_empty(&episode.summary, &episode.description);

    let mut item = Element::new("item")
        .child(Element::text("title", &episode.title))
        .child(Element::text("description", description))
        .child(Element::text("link", &episode.link))
        .child(Element::text("guid", resolve_identifier(episode)).attr("isPermaLink", "false"));

    if let Some(published) = episode.published {
        item.push(Element::text(
            "pubDate",
            published.format(DATE_FORMAT).to_string(),
        ));
    }

    // Only the first enclosure is ever carried over.
    if let Some(enclosure) = episode.enclosures.first() {
        item.push(
            Element::new("enclosure")
                .attr("url", &enclosure.url)
                .attr(
                    "length",
                    prefer_non_empty(&enclosure.length, DEFAULT_ENCLOSURE_LENGTH),
                )
                .attr(
                    "type",
                    prefer_non_empty(&enclosure.mime_type, DEFAULT_ENCLOSURE_TYPE),
                ),
        );
    }

    item.child(ext.text("author", &episode.author))
        .child(ext.text("summary", description))
        .child(ext.text("duration", &episode.duration))
        .child(ext.text("explicit", normalize_explicit(&episode.explicit)))
        .child(Element::new(ext.tag("image")).attr("href", image))
}

/// Returns the episode's unique identifier.
///
/// Priority: explicit id, then guid, then link, then the title concatenated
/// with the raw publication string.
pub fn resolve_identifier(episode: &Episode) -> String {
    [&episode.id, &episode.guid, &episode.link]
        .into_iter()
        .find(|candidate| !candidate.is_empty())
        .cloned()
        .unwrap_or_else(|| format!("{}{}", episode.title, episode.published_raw))
}

/// Normalizes an explicit flag to `"yes"`/`"no"`.
///
/// Boolean-like values (`true`/`false`, `yes`/`no`, `explicit`/`clean`) map
/// to `"yes"` or `"no"`; a missing flag is `"no"`. Anything else is passed
/// through unchanged.
pub fn normalize_explicit(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "yes" | "explicit" => "yes".to_string(),
        "false" | "no" | "clean" | "" => "no".to_string(),
        _ => trimmed.to_string(),
    }
}

/// Channel artwork: `<image><url>`, then the extension image, then the
/// placeholder.
fn resolve_channel_artwork(channel: &Channel) -> (String, ArtworkSource) {
    match channel
        .image_url
        .as_deref()
        .or(channel.extension_image_url.as_deref())
    {
        Some(url) => (url.to_string(), ArtworkSource::Own),
        None => (PLACEHOLDER_ARTWORK.to_string(), ArtworkSource::Placeholder),
    }
}

/// Episode artwork: its own, then the channel's resolved image (which is
/// itself the placeholder when the channel had none).
fn resolve_episode_artwork<'a>(
    episode: &'a Episode,
    channel_image: &'a str,
) -> (&'a str, ArtworkSource) {
    match episode.image_url.as_deref() {
        Some(url) => (url, ArtworkSource::Own),
        None if channel_image == PLACEHOLDER_ARTWORK => (channel_image, ArtworkSource::Placeholder),
        None => (channel_image, ArtworkSource::Channel),
    }
}

fn prefer_non_empty<'a>(preferred: &'a str, fallback: &'a str) -> &'a str {
    if preferred.is_empty() {
        fallback
    } else {
        preferred
    }
}
