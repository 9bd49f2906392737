//! # WXR Module
//!
//! Reading and writing WordPress eXtended RSS exports.
//!
//! - `tree`: lossless XML tree built on `quick-xml`
//! - `export`: item records (`Post`) on top of the tree
//!
//! ```rust
//! use wpcat_core::wxr::Export;
//!
//! let xml = "<rss><channel><item><title>Hello</title>\
//!            <wp:post_id>1</wp:post_id></item></channel></rss>";
//! let export = Export::parse(xml).unwrap();
//! assert_eq!(export.posts()[0].title, "Hello");
//! assert_eq!(export.to_xml().unwrap(), xml);
//! ```

mod export;
mod tree;

pub use export::{Export, Post, PostKind};
pub use tree::{Document, Element, Node};
