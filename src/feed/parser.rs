use std::borrow::Cow;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use thiserror::Error;

use super::model::{
    Category, Channel, Enclosure, Episode, Owner, ParsedFeed, DEFAULT_EXTENSION_NAMESPACE,
};

/// Maximum element nesting depth accepted from a source feed.
/// Guards the tree builder against pathologically nested input.
const MAX_DEPTH: usize = 64;

/// Substring identifying a podcast extension namespace URI.
const EXTENSION_NAMESPACE_MARKER: &str = "itunes.com/dtds/podcast";

/// Errors that can occur while turning feed bytes into a [`ParsedFeed`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The input is not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// Element nesting exceeds the safety limit.
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// The document is well-formed but has no `<channel>` under its root.
    #[error("Could not find the <channel> element; this is not a valid RSS feed")]
    MissingChannel,
}

/// Parses raw feed bytes into a fully defaulted [`ParsedFeed`].
///
/// Missing optional fields never cause a failure: text fields become empty
/// strings and structured fields (owner, artwork, enclosures, categories)
/// are simply absent.
///
/// Extension tags are matched by their resolved namespace URI rather than
/// by prefix, so a feed that binds the podcast namespace to an unusual
/// prefix is still understood. The first podcast namespace URI seen in the
/// document is preserved in [`ParsedFeed::extension_namespace`].
///
/// # Errors
///
/// - [`ParseError::Xml`] if the input is not well-formed XML
/// - [`ParseError::MaxDepthExceeded`] if elements nest deeper than 64 levels
/// - [`ParseError::MissingChannel`] if the root has no `<channel>` child
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    let Document {
        root,
        extension_namespace,
    } = read_document(bytes)?;

    let channel_node = root.child("channel").ok_or(ParseError::MissingChannel)?;

    let channel = parse_channel(channel_node);
    let episodes: Vec<Episode> = channel_node
        .children_named("item")
        .map(parse_episode)
        .collect();

    let extension_namespace =
        extension_namespace.unwrap_or_else(|| DEFAULT_EXTENSION_NAMESPACE.to_string());

    tracing::debug!(
        title = %channel.title,
        episodes = episodes.len(),
        namespace = %extension_namespace,
        "Parsed feed"
    );

    Ok(ParsedFeed {
        channel,
        episodes,
        extension_namespace,
    })
}

/// Returns true if `uri` names the podcast extension namespace.
pub fn is_extension_namespace(uri: &str) -> bool {
    uri.to_ascii_lowercase().contains(EXTENSION_NAMESPACE_MARKER)
}

// ============================================================================
// Element tree
// ============================================================================

/// A minimal element tree. Only what the channel/episode extraction needs
/// is kept: resolved namespace, local name, attributes and text.
#[derive(Debug, Default)]
struct Node {
    namespace: Option<String>,
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn is_plain(&self, name: &str) -> bool {
        self.namespace.is_none() && self.name == name
    }

    fn is_extension(&self, name: &str) -> bool {
        self.name == name
            && self
                .namespace
                .as_deref()
                .is_some_and(is_extension_namespace)
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.is_plain(name))
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.is_plain(name))
    }

    fn extension_child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.is_extension(name))
    }

    fn extension_children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.children.iter().filter(move |c| c.is_extension(name))
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn trimmed_text(&self) -> String {
        self.text.trim().to_string()
    }

    fn text_of(&self, name: &str) -> String {
        self.child(name).map(Node::trimmed_text).unwrap_or_default()
    }

    fn extension_text_of(&self, name: &str) -> String {
        self.extension_child(name)
            .map(Node::trimmed_text)
            .unwrap_or_default()
    }
}

struct Document {
    root: Node,
    extension_namespace: Option<String>,
}

fn read_document(bytes: &[u8]) -> Result<Document, ParseError> {
    // quick-xml (0.37) never expands <!ENTITY> declarations; only the five
    // predefined entities and character references are resolved. Text is
    // decoded with the charset named in the XML declaration (UTF-8 if none).
    let mut reader = NsReader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;
    let mut extension_namespace: Option<String> = None;

    loop {
        let (resolved, event) = reader
            .read_resolved_event_into(&mut buf)
            .map_err(|e| ParseError::Xml(e.to_string()))?;
        let namespace = match resolved {
            ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
            _ => None,
        };

        match event {
            Event::Start(e) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(ParseError::MaxDepthExceeded(MAX_DEPTH));
                }
                let node = open_node(&e, namespace, &reader, &mut extension_namespace)?;
                stack.push(node);
            }
            Event::Empty(e) => {
                let node = open_node(&e, namespace, &reader, &mut extension_namespace)?;
                attach(node, &mut stack, &mut root);
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    attach(node, &mut stack, &mut root);
                }
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    let text = t.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    let text = c.decode().map_err(|e| ParseError::Xml(e.to_string()))?;
                    top.text.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::Xml(format!(
            "unexpected end of document: <{}> is not closed",
            open.name
        )));
    }

    let root = root.ok_or_else(|| ParseError::Xml("document has no root element".into()))?;
    Ok(Document {
        root,
        extension_namespace,
    })
}

fn open_node(
    e: &BytesStart<'_>,
    namespace: Option<String>,
    reader: &NsReader<&[u8]>,
    extension_namespace: &mut Option<String>,
) -> Result<Node, ParseError> {
    if extension_namespace.is_none() {
        if let Some(uri) = namespace.as_deref().filter(|uri| is_extension_namespace(uri)) {
            *extension_namespace = Some(uri.to_string());
        }
    }

    let mut attributes = Vec::new();
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed attribute");
                continue;
            }
        };
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| ParseError::Xml(e.to_string()))?;

        if attr.key.as_namespace_binding().is_some() {
            if extension_namespace.is_none() && is_extension_namespace(&value) {
                *extension_namespace = Some(value.into_owned());
            }
            continue;
        }

        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        attributes.push((key, Cow::into_owned(value)));
    }

    Ok(Node {
        namespace,
        name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
        attributes,
        ..Node::default()
    })
}

fn attach(node: Node, stack: &mut [Node], root: &mut Option<Node>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

// ============================================================================
// Field extraction
// ============================================================================

fn parse_channel(node: &Node) -> Channel {
    let author = Some(node.extension_text_of("author"))
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| node.text_of("managingEditor"));

    let owner = node.extension_child("owner").and_then(|owner| {
        let name = owner.extension_text_of("name");
        let email = owner.extension_text_of("email");
        if name.is_empty() && email.is_empty() {
            None
        } else {
            Some(Owner { name, email })
        }
    });

    let image_url = node
        .child("image")
        .map(|image| image.text_of("url"))
        .filter(|url| !url.is_empty());

    Channel {
        title: node.text_of("title"),
        link: node.text_of("link"),
        description: node.text_of("description"),
        language: node.text_of("language"),
        author,
        summary: node.extension_text_of("summary"),
        explicit: node.extension_text_of("explicit"),
        owner,
        categories: node
            .extension_children("category")
            .filter_map(parse_category)
            .collect(),
        image_url,
        extension_image_url: extension_image_href(node),
    }
}

fn parse_category(node: &Node) -> Option<Category> {
    let term = node.attribute("text")?.trim();
    if term.is_empty() {
        return None;
    }
    Some(Category {
        term: term.to_string(),
        subcategories: node
            .extension_children("category")
            .filter_map(parse_category)
            .collect(),
    })
}

fn parse_episode(node: &Node) -> Episode {
    let published_raw = node.text_of("pubDate");
    let published = parse_date(&published_raw);
    if published.is_none() && !published_raw.is_empty() {
        tracing::debug!(date = %published_raw, "Unparseable publication date");
    }

    let author = Some(node.extension_text_of("author"))
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| node.text_of("author"));

    Episode {
        title: node.text_of("title"),
        description: node.text_of("description"),
        link: node.text_of("link"),
        id: node.text_of("id"),
        guid: node.text_of("guid"),
        published_raw,
        published,
        enclosures: node.children_named("enclosure").map(parse_enclosure).collect(),
        author,
        summary: node.extension_text_of("summary"),
        duration: node.extension_text_of("duration"),
        explicit: node.extension_text_of("explicit"),
        image_url: extension_image_href(node),
    }
}

fn parse_enclosure(node: &Node) -> Enclosure {
    let attr = |key| node.attribute(key).unwrap_or_default().trim().to_string();
    Enclosure {
        url: attr("url"),
        length: attr("length"),
        mime_type: attr("type"),
    }
}

fn extension_image_href(node: &Node) -> Option<String> {
    node.extension_child("image")
        .and_then(|image| image.attribute("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
}

/// Parses an RSS publication date, accepting RFC 2822 and RFC 3339.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
