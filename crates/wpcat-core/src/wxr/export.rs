//! WordPress export (WXR) records.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::category::CategoryAssignment;
use crate::error::{Result, WpcatError};

use super::tree::{Document, Element, Node};

const ITEM: &str = "item";
const POST_ID: &str = "wp:post_id";
const POST_TYPE: &str = "wp:post_type";
const CATEGORY: &str = "category";
const CATEGORY_DOMAIN: &str = "category";

/// Record type of a WXR item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostKind {
    Post,
    Page,
    Attachment,
    Revision,
    NavMenuItem,
    Other(String),
}

impl PostKind {
    pub fn from_type(post_type: &str) -> Self {
        match post_type.trim() {
            "post" => Self::Post,
            "page" => Self::Page,
            "attachment" => Self::Attachment,
            "revision" => Self::Revision,
            "nav_menu_item" => Self::NavMenuItem,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Post => "post",
            Self::Page => "page",
            Self::Attachment => "attachment",
            Self::Revision => "revision",
            Self::NavMenuItem => "nav_menu_item",
            Self::Other(other) => other,
        }
    }
}

/// One `<item>` of the export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub kind: PostKind,
    /// Assigned during reconciliation; appended to the item on render
    pub categories: Vec<CategoryAssignment>,
    /// Position among the channel's `<item>` elements
    item_index: usize,
}

impl Post {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: PostKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            categories: Vec::new(),
            item_index: 0,
        }
    }

    /// Only genuine posts are sent to the classifier.
    pub fn is_eligible(&self) -> bool {
        self.kind == PostKind::Post
    }

    pub fn is_categorized(&self) -> bool {
        !self.categories.is_empty()
    }

    fn from_item(item: &Element, item_index: usize) -> Self {
        let id = item
            .child(POST_ID)
            .map(|e| e.text().trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("item-{}", item_index + 1));
        let title = item.child("title").map(Element::text).unwrap_or_default();
        let kind = item
            .child(POST_TYPE)
            .map(|e| PostKind::from_type(&e.text()))
            .unwrap_or(PostKind::Post);

        Self {
            id,
            title,
            kind,
            categories: Vec::new(),
            item_index,
        }
    }
}

/// A loaded export: the untouched document plus its item records.
#[derive(Debug, Clone)]
pub struct Export {
    document: Document,
    posts: Vec<Post>,
}

impl Export {
    /// Read and parse an export file. Fails with `NoPosts` when it holds no posts.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let export = Self::parse(&content)?;
        if export.eligible_count() == 0 {
            return Err(WpcatError::NoPosts {
                path: path.to_path_buf(),
            });
        }
        Ok(export)
    }

    pub fn parse(xml: &str) -> Result<Self> {
        let document = Document::parse(xml)?;
        let channel = channel(&document)?;

        let posts: Vec<Post> = channel
            .elements()
            .filter(|e| e.name == ITEM)
            .enumerate()
            .map(|(index, item)| Post::from_item(item, index))
            .collect();

        debug!(items = posts.len(), "parsed export");
        Ok(Self { document, posts })
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn posts_mut(&mut self) -> &mut [Post] {
        &mut self.posts
    }

    pub fn eligible_count(&self) -> usize {
        self.posts.iter().filter(|p| p.is_eligible()).count()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Document with every post's assigned categories appended to its item.
    pub fn categorized_document(&self) -> Result<Document> {
        let mut document = self.document.clone();
        let channel = channel_mut(&mut document)?;

        let mut items: Vec<&mut Element> =
            channel.elements_mut().filter(|e| e.name == ITEM).collect();
        for post in self.posts.iter().filter(|p| p.is_categorized()) {
            if let Some(item) = items.get_mut(post.item_index) {
                append_categories(item, &post.categories);
            }
        }

        Ok(document)
    }

    /// Serialized export including assigned categories.
    pub fn to_xml(&self) -> Result<String> {
        self.categorized_document()?.to_xml()
    }
}

fn channel(document: &Document) -> Result<&Element> {
    document
        .root()
        .filter(|root| root.name == "rss")
        .and_then(|root| root.child("channel"))
        .ok_or_else(|| WpcatError::NotAnExport {
            message: "expected <rss><channel>".to_string(),
        })
}

fn channel_mut(document: &mut Document) -> Result<&mut Element> {
    document
        .root_mut()
        .filter(|root| root.name == "rss")
        .and_then(|root| root.elements_mut().find(|e| e.name == "channel"))
        .ok_or_else(|| WpcatError::NotAnExport {
            message: "expected <rss><channel>".to_string(),
        })
}

/// `<category domain="category" nicename="slug"><![CDATA[Label]]></category>`
fn category_element(category: &CategoryAssignment) -> Element {
    Element::new(CATEGORY)
        .with_attribute("domain", CATEGORY_DOMAIN)
        .with_attribute(
            "nicename",
            quick_xml::escape::escape(category.slug.as_str()).into_owned(),
        )
        .with_child(Node::CData(category.label.clone()))
}

fn append_categories(item: &mut Element, categories: &[CategoryAssignment]) {
    let indent = item.child_indent().map(str::to_string);
    let mut position = item
        .children
        .iter()
        .rposition(|n| matches!(n, Node::Element(_)))
        .map(|i| i + 1)
        .unwrap_or(item.children.len());

    for category in categories {
        if let Some(indent) = &indent {
            item.children.insert(position, Node::Text(indent.clone()));
            position += 1;
        }
        item.children
            .insert(position, Node::Element(category_element(category)));
        position += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<rss version="2.0" xmlns:wp="http://wordpress.org/export/1.2/">
	<channel>
		<title>Example Blog</title>
		<item>
			<title>Town Hall &amp; You</title>
			<wp:post_id>42</wp:post_id>
			<wp:post_type><![CDATA[post]]></wp:post_type>
		</item>
		<item>
			<title><![CDATA[logo.png]]></title>
			<wp:post_id>43</wp:post_id>
			<wp:post_type><![CDATA[attachment]]></wp:post_type>
			<wp:attachment_url data-x="a&amp;b">https://example.com/logo.png</wp:attachment_url>
		</item>
	</channel>
</rss>
"#;

    #[test]
    fn test_parse_items() {
        let export = Export::parse(SAMPLE).unwrap();
        let posts = export.posts();
        assert_eq!(posts.len(), 2);

        assert_eq!(posts[0].id, "42");
        assert_eq!(posts[0].title, "Town Hall & You");
        assert_eq!(posts[0].kind, PostKind::Post);
        assert!(posts[0].is_eligible());

        assert_eq!(posts[1].kind, PostKind::Attachment);
        assert!(!posts[1].is_eligible());
        assert_eq!(export.eligible_count(), 1);
    }

    #[test]
    fn test_unchanged_export_roundtrips() {
        let export = Export::parse(SAMPLE).unwrap();
        assert_eq!(export.to_xml().unwrap(), SAMPLE);
    }

    #[test]
    fn test_categories_appended_with_indent() {
        let mut export = Export::parse(SAMPLE).unwrap();
        export.posts_mut()[0].categories = vec![
            CategoryAssignment::from_slug("news"),
            CategoryAssignment::from_slug("senior-life"),
        ];
        let xml = export.to_xml().unwrap();

        assert!(xml.contains(
            "<wp:post_type><![CDATA[post]]></wp:post_type>\n\
             \t\t\t<category domain=\"category\" nicename=\"news\"><![CDATA[News]]></category>\n\
             \t\t\t<category domain=\"category\" nicename=\"senior-life\"><![CDATA[Senior Life]]></category>\n\
             \t\t</item>"
        ));
        // Document held by the export stays untouched
        assert_eq!(export.document().to_xml().unwrap(), SAMPLE);
    }

    #[test]
    fn test_non_post_items_preserved() {
        let mut export = Export::parse(SAMPLE).unwrap();
        export.posts_mut()[0].categories = vec![CategoryAssignment::from_slug("news")];

        let original = export.document().clone();
        let categorized = export.categorized_document().unwrap();

        let attachment = |doc: &Document| {
            doc.root()
                .and_then(|r| r.child("channel"))
                .and_then(|c| c.elements().filter(|e| e.name == ITEM).nth(1).cloned())
                .unwrap()
        };
        assert_eq!(attachment(&original), attachment(&categorized));
        assert!(export.to_xml().unwrap().contains(r#"data-x="a&amp;b""#));
    }

    #[test]
    fn test_missing_post_id_falls_back() {
        let xml = "<rss><channel><item><title>No id</title></item></channel></rss>";
        let export = Export::parse(xml).unwrap();
        assert_eq!(export.posts()[0].id, "item-1");
        assert_eq!(export.posts()[0].kind, PostKind::Post);
    }

    #[test]
    fn test_not_rss_is_error() {
        assert!(matches!(
            Export::parse("<html><body/></html>"),
            Err(WpcatError::NotAnExport { .. })
        ));
    }

    #[test]
    fn test_load_without_posts_is_no_posts() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pages.xml");
        fs::write(
            &path,
            "<rss><channel><item><title>About</title>\
             <wp:post_type>page</wp:post_type></item></channel></rss>",
        )
        .unwrap();
        assert!(matches!(
            Export::load(&path),
            Err(WpcatError::NoPosts { .. })
        ));
    }
}
