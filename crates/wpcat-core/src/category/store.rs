//! Allowed Category Set
//!
//! The closed list of category slugs a run may assign. Fixed once built.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WpcatError};

/// Caller-supplied set of valid category slugs, in the order given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedCategories {
    slugs: Vec<String>,
    index: HashSet<String>,
}

impl AllowedCategories {
    /// Build from individual slugs. Entries are trimmed, empties and duplicates dropped.
    pub fn new<I, S>(slugs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered = Vec::new();
        let mut index = HashSet::new();
        for slug in slugs {
            let slug = slug.as_ref().trim();
            if slug.is_empty() {
                continue;
            }
            if index.insert(slug.to_string()) {
                ordered.push(slug.to_string());
            }
        }

        if ordered.is_empty() {
            return Err(WpcatError::EmptyCategories);
        }

        Ok(Self {
            slugs: ordered,
            index,
        })
    }

    /// Parse a comma-separated list such as `"news, senior-life"`.
    pub fn parse(list: &str) -> Result<Self> {
        Self::new(list.split(','))
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.index.contains(slug)
    }

    pub fn slugs(&self) -> &[String] {
        &self.slugs
    }

    pub fn len(&self) -> usize {
        self.slugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slugs.is_empty()
    }
}

/// One category attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    pub slug: String,
    pub label: String,
}

impl CategoryAssignment {
    pub fn from_slug(slug: &str) -> Self {
        Self {
            slug: slug.to_string(),
            label: display_label(slug),
        }
    }
}

/// Human-readable label for a slug: `senior-life` becomes `Senior Life`.
pub fn display_label(slug: &str) -> String {
    slug.split('-')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
