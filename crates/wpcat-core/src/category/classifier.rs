//! Category Classifier
//!
//! Wraps an LLM backend behind the classification contract: titles in,
//! `title -> allowed slugs` out. Upstream output is untrusted and is validated
//! field by field before anything reaches the caller.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, WpcatError};
use crate::llm::LlmBackend;

use super::store::AllowedCategories;

/// Result of one classifier call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Title as echoed by the classifier -> allowed slugs (never empty)
    pub assignments: HashMap<String, Vec<String>>,
    /// Response elements dropped during validation
    pub discarded: usize,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

/// Anything that can assign allowed categories to a list of titles.
pub trait Classify {
    fn classify(&self, titles: &[String], allowed: &AllowedCategories) -> Result<Classification>;
}

/// Classifier adapter over an [`LlmBackend`].
pub struct CategoryClassifier<B> {
    backend: B,
}

impl<B: LlmBackend> CategoryClassifier<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: LlmBackend> Classify for CategoryClassifier<B> {
    fn classify(&self, titles: &[String], allowed: &AllowedCategories) -> Result<Classification> {
        let prompt = build_prompt(titles, allowed);
        debug!(titles = titles.len(), backend = self.backend.name(), "sending batch");

        let output = self.backend.complete(&prompt)?;
        let classification = parse_classification(&output, allowed)?;

        debug!(
            answered = classification.assignments.len(),
            discarded = classification.discarded,
            "batch answered"
        );
        Ok(classification)
    }
}

/// Prompt asking for a JSON array of `{title, categories}` restricted to `allowed`.
pub fn build_prompt(titles: &[String], allowed: &AllowedCategories) -> String {
    let category_list = allowed.slugs().join(", ");
    let title_list = serde_json::to_string_pretty(titles).unwrap_or_else(|_| {
        titles
            .iter()
            .map(|t| format!("- {}", t))
            .collect::<Vec<_>>()
            .join("\n")
    });

    format!(
        r#"Categorize each of the following blog post titles.

## Allowed Categories

{category_list}

## Titles

{title_list}

## Rules

- Use ONLY the allowed category slugs listed above, spelled exactly as given.
- Do NOT invent new categories.
- Do NOT return titles that are not in the list above. Copy each title exactly.
- A post may belong to more than one category.

## Output Format

Output a JSON array where each element has:
- "title": the post title, exactly as given
- "categories": array of allowed category slugs

Example:
```json
[
  {{"title": "Ten Tips for Retirement Planning", "categories": ["finance", "senior-life"]}}
]
```

Output ONLY the JSON array, no other text.
"#
    )
}

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````) if present.
pub fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (`json`, `JSON`, ...) on the opening line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Validate raw classifier output into a [`Classification`].
///
/// Fails only when the text is not JSON or not an array. Individual bad
/// elements are dropped and counted.
pub fn parse_classification(output: &str, allowed: &AllowedCategories) -> Result<Classification> {
    let cleaned = strip_code_fence(output);

    let value: Value =
        serde_json::from_str(cleaned).map_err(|e| WpcatError::MalformedResponse {
            message: format!("not valid JSON: {}", e),
        })?;

    let Value::Array(elements) = value else {
        return Err(WpcatError::MalformedResponse {
            message: "top-level value is not an array".to_string(),
        });
    };

    let mut classification = Classification::default();
    for element in &elements {
        match ResponseEntry::from_value(element, allowed) {
            Some(entry) => {
                classification
                    .assignments
                    .entry(entry.title)
                    .or_insert_with(Vec::new)
                    .extend(entry.categories);
            }
            None => classification.discarded += 1,
        }
    }

    for slugs in classification.assignments.values_mut() {
        dedup_in_order(slugs);
    }

    Ok(classification)
}

/// A validated response element.
#[derive(Debug, PartialEq, Eq)]
struct ResponseEntry {
    title: String,
    categories: Vec<String>,
}

impl ResponseEntry {
    /// `None` when the element is not an object, has a non-string `title`,
    /// a non-array `categories`, or no allowed categories left after filtering.
    fn from_value(value: &Value, allowed: &AllowedCategories) -> Option<Self> {
        let object = value.as_object()?;
        let title = object.get("title")?.as_str()?;
        let categories: Vec<String> = object
            .get("categories")?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .filter(|slug| allowed.contains(slug))
            .map(str::to_string)
            .collect();

        if categories.is_empty() {
            return None;
        }

        Some(Self {
            title: title.to_string(),
            categories,
        })
    }
}

fn dedup_in_order(slugs: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    slugs.retain(|slug| seen.insert(slug.clone()));
}
