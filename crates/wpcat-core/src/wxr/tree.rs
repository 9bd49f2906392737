//! Lossless XML tree.
//!
//! Text, CDATA, comments and attribute values are stored in their raw
//! (still escaped) form so a parse/write cycle reproduces them verbatim.

use std::borrow::Cow;

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};

use crate::error::{Result, WpcatError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Raw escaped character data
    Text(String),
    CData(String),
    Comment(String),
    /// Content between `<?` and `?>` of the XML declaration
    Decl(String),
    ProcessingInstruction(String),
    DocType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// `(qualified name, raw escaped value)` in document order
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
    /// Written as `<name/>` when it has no children
    pub self_closing: bool,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
            self_closing: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, raw_value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), raw_value.into()));
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Raw (escaped) value of an attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Unescaped text of the element: text and CDATA children concatenated.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                Node::Text(raw) => match quick_xml::escape::unescape(raw) {
                    Ok(text) => out.push_str(&text),
                    Err(_) => out.push_str(raw),
                },
                Node::CData(data) => out.push_str(data),
                _ => {}
            }
        }
        out
    }

    /// Whitespace text node directly before the last child element, if any.
    ///
    /// Used to indent appended children like their siblings.
    pub fn child_indent(&self) -> Option<&str> {
        let last_element = self
            .children
            .iter()
            .rposition(|n| matches!(n, Node::Element(_)))?;
        match self.children.get(last_element.checked_sub(1)?)? {
            Node::Text(t) if t.trim().is_empty() => Some(t.as_str()),
            _ => None,
        }
    }
}

/// A parsed XML document: top-level nodes in order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    /// Input started with a UTF-8 byte order mark
    pub bom: bool,
    pub nodes: Vec<Node>,
}

impl Document {
    pub fn parse(xml: &str) -> Result<Self> {
        let (bom, xml) = match xml.strip_prefix('\u{feff}') {
            Some(rest) => (true, rest),
            None => (false, xml),
        };
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        // Open elements; the document itself sits below the stack
        let mut stack: Vec<Element> = Vec::new();
        let mut top: Vec<Node> = Vec::new();

        loop {
            let event = reader.read_event()?;
            let node = match event {
                Event::Start(start) => {
                    stack.push(element_from_start(&start, false)?);
                    continue;
                }
                Event::Empty(start) => Node::Element(element_from_start(&start, true)?),
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| WpcatError::NotAnExport {
                        message: "unbalanced closing tag".to_string(),
                    })?;
                    Node::Element(element)
                }
                Event::Text(text) => Node::Text(raw_string(&text)),
                Event::GeneralRef(reference) => {
                    Node::Text(format!("&{};", String::from_utf8_lossy(&reference)))
                }
                Event::CData(data) => Node::CData(raw_string(&data)),
                Event::Comment(comment) => Node::Comment(raw_string(&comment)),
                Event::Decl(decl) => Node::Decl(raw_string(&decl)),
                Event::PI(pi) => Node::ProcessingInstruction(raw_string(&pi)),
                Event::DocType(doctype) => Node::DocType(raw_string(&doctype)),
                Event::Eof => break,
            };

            let siblings = match stack.last_mut() {
                Some(parent) => &mut parent.children,
                None => &mut top,
            };
            push_merging_text(siblings, node);
        }

        if let Some(open) = stack.last() {
            return Err(WpcatError::NotAnExport {
                message: format!("unclosed element <{}>", open.name),
            });
        }

        Ok(Self { bom, nodes: top })
    }

    /// First top-level element.
    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn root_mut(&mut self) -> Option<&mut Element> {
        self.nodes.iter_mut().find_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        if self.bom {
            writer.get_mut().extend_from_slice("\u{feff}".as_bytes());
        }
        for node in &self.nodes {
            write_node(&mut writer, node)?;
        }
        String::from_utf8(writer.into_inner()).map_err(|e| WpcatError::NotAnExport {
            message: format!("serialized output is not UTF-8: {}", e),
        })
    }
}

fn raw_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Entity references arrive as separate events; fold them back into the
/// surrounding text node.
fn push_merging_text(siblings: &mut Vec<Node>, node: Node) {
    if let Node::Text(text) = &node {
        if let Some(Node::Text(previous)) = siblings.last_mut() {
            previous.push_str(text);
            return;
        }
    }
    siblings.push(node);
}

fn element_from_start(start: &BytesStart<'_>, self_closing: bool) -> Result<Element> {
    let mut element = Element::new(raw_string(start.name().as_ref()));
    element.self_closing = self_closing;
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        element
            .attributes
            .push((raw_string(attr.key.as_ref()), raw_string(&attr.value)));
    }
    Ok(element)
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<()> {
    match node {
        Node::Element(element) => write_element(writer, element)?,
        Node::Text(raw) => writer.write_event(Event::Text(BytesText::from_escaped(raw.as_str())))?,
        Node::CData(data) => writer.write_event(Event::CData(BytesCData::new(data.as_str())))?,
        Node::Comment(raw) => {
            writer.write_event(Event::Comment(BytesText::from_escaped(raw.as_str())))?
        }
        Node::Decl(raw) => {
            let start = BytesStart::from_content(raw.as_str(), 3);
            writer.write_event(Event::Decl(BytesDecl::from_start(start)))?
        }
        Node::ProcessingInstruction(raw) => {
            writer.write_event(Event::PI(BytesPI::new(raw.as_str())))?
        }
        Node::DocType(raw) => {
            writer.write_event(Event::DocType(BytesText::from_escaped(raw.as_str())))?
        }
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        // Values are already escaped; the Attribute struct is written as-is.
        // Single-quoted sources may still hold a bare `"`.
        let value: Cow<'_, [u8]> = if value.contains('"') {
            Cow::Owned(value.replace('"', "&quot;").into_bytes())
        } else {
            Cow::Borrowed(value.as_bytes())
        };
        start.push_attribute(Attribute {
            key: QName(key.as_bytes()),
            value,
        });
    }

    if element.self_closing && element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_preserves_text_verbatim() {
        let xml = "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n\
                   <!-- generator -->\n\
                   <rss version=\"2.0\" xmlns:wp=\"http://wordpress.org/export/1.2/\">\n\
                   \t<channel>\n\
                   \t\t<title>Tom &amp; Jerry&#8217;s</title>\n\
                   \t\t<empty a=\"1\"/>\n\
                   \t\t<body><![CDATA[<p>raw & html</p>]]></body>\n\
                   \t</channel>\n\
                   </rss>\n";
        let doc = Document::parse(xml).unwrap();
        assert_eq!(doc.to_xml().unwrap(), xml);
    }

    #[test]
    fn test_roundtrip_keeps_byte_order_mark() {
        let xml = "\u{feff}<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss><channel/></rss>\n";
        let doc = Document::parse(xml).unwrap();
        assert!(doc.bom);
        assert_eq!(doc.root().unwrap().name, "rss");
        assert_eq!(doc.to_xml().unwrap(), xml);

        let plain = Document::parse("<rss/>").unwrap();
        assert!(!plain.bom);
        assert!(!plain.to_xml().unwrap().starts_with('\u{feff}'));
    }

    #[test]
    fn test_attribute_values_not_reescaped() {
        let xml = r#"<a href="x?a=1&amp;b=&quot;2&quot;" title='single'/>"#;
        let doc = Document::parse(xml).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.attribute("href"), Some("x?a=1&amp;b=&quot;2&quot;"));
        let out = doc.to_xml().unwrap();
        assert!(out.contains(r#"href="x?a=1&amp;b=&quot;2&quot;""#));
    }

    #[test]
    fn test_text_unescapes_and_joins_cdata() {
        let doc = Document::parse("<t>Fish &amp; <![CDATA[Chips & Co]]></t>").unwrap();
        assert_eq!(doc.root().unwrap().text(), "Fish & Chips & Co");
    }

    #[test]
    fn test_unclosed_element_is_error() {
        assert!(Document::parse("<rss><channel>").is_err());
    }

    #[test]
    fn test_child_indent() {
        let doc = Document::parse("<item>\n\t\t\t<a/>\n\t\t\t<b/>\n\t\t</item>").unwrap();
        assert_eq!(doc.root().unwrap().child_indent(), Some("\n\t\t\t"));
    }

    #[test]
    fn test_builder_helpers() {
        let element = Element::new("category")
            .with_attribute("domain", "category")
            .with_child(Node::CData("News".to_string()));
        let doc = Document {
            nodes: vec![Node::Element(element)],
            ..Document::default()
        };
        assert_eq!(
            doc.to_xml().unwrap(),
            r#"<category domain="category"><![CDATA[News]]></category>"#
        );
    }
}
