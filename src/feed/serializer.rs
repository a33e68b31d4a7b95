//! Rendering of the synthesized feed document as indented XML.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

/// An output element. Attributes and children are rendered exactly in
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// An element holding only text.
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Direct children with the given name, in order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First direct child with the given name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Renders `root` as a UTF-8 XML document with a declaration and
/// two-space indentation.
///
/// Output is a pure function of the input tree. Elements with neither text
/// nor children are written self-closing.
pub fn render(root: &Element) -> Result<String, quick_xml::Error> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    write_element(&mut writer, root)?;

    let mut bytes = writer.into_inner().into_inner();
    bytes.push(b'\n');
    // The writer only ever receives &str input.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    element: &Element,
) -> Result<(), quick_xml::Error> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.text.is_empty() && element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    if !element.text.is_empty() {
        writer.write_event(Event::Text(BytesText::new(&element.text)))?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_declaration_and_indentation() {
        let doc = Element::new("rss").attr("version", "2.0").child(
            Element::new("channel")
                .child(Element::text("title", "Show"))
                .child(Element::new("empty")),
        );

        let xml = render(&doc).unwrap();
        let expected = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Show</title>
    <empty/>
  </channel>
</rss>
"#;
        assert_eq!(xml, expected);
    }

    #[test]
    fn test_render_escapes_text_and_attributes() {
        let doc = Element::new("item")
            .child(Element::text("title", "Q&A <live>"))
            .child(Element::new("enclosure").attr("url", "https://x.test/a?b=1&c=\"2\""));

        let xml = render(&doc).unwrap();
        assert!(xml.contains("<title>Q&amp;A &lt;live&gt;</title>"));
        assert!(xml.contains("url=\"https://x.test/a?b=1&amp;c=&quot;2&quot;\""));
    }

    #[test]
    fn test_render_preserves_insertion_order() {
        let doc = Element::new("channel")
            .attr("z", "1")
            .attr("a", "2")
            .child(Element::text("zeta", "1"))
            .child(Element::text("alpha", "2"))
            .child(Element::text("zeta", "3"));

        let xml = render(&doc).unwrap();
        assert!(xml.contains(r#"<channel z="1" a="2">"#));
        let zeta = xml.find("<zeta>1").unwrap();
        let alpha = xml.find("<alpha>").unwrap();
        let zeta_again = xml.find("<zeta>3").unwrap();
        assert!(zeta < alpha && alpha < zeta_again);
    }

    #[test]
    fn test_render_is_deterministic() {
        let doc = Element::new("rss").child(Element::text("title", "Same"));
        assert_eq!(render(&doc).unwrap(), render(&doc).unwrap());
    }
}
