//! # Category Module
//!
//! Assigns blog posts to categories from a closed, caller-supplied set.
//!
//! ## Module layout
//!
//! - `store`: the allowed category set and per-post assignments
//! - `classifier`: the classification contract and its LLM-backed adapter
//!
//! ## Example
//!
//! ```rust
//! use wpcat_core::category::{display_label, parse_classification, AllowedCategories};
//!
//! let allowed = AllowedCategories::parse("news, senior-life").unwrap();
//! assert!(allowed.contains("senior-life"));
//! assert_eq!(display_label("senior-life"), "Senior Life");
//!
//! // Invented categories are filtered out, code fences stripped
//! let raw = "```json\n[{\"title\": \"Bingo Night\", \"categories\": [\"senior-life\", \"gossip\"]}]\n```";
//! let result = parse_classification(raw, &allowed).unwrap();
//! assert_eq!(result.assignments["Bingo Night"], vec!["senior-life".to_string()]);
//! ```

mod classifier;
mod store;

// Re-exports
pub use classifier::{
    build_prompt, parse_classification, strip_code_fence, CategoryClassifier, Classification,
    Classify,
};
pub use store::{display_label, AllowedCategories, CategoryAssignment};
