//! Output projection: the categorized WXR export and the flat CSV summary.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::OutputConfig;
use crate::error::Result;
use crate::wxr::{Export, Post};

/// Target representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// WordPress export with categories appended
    Xml,
    /// One row per categorized post
    Csv,
}

impl OutputFormat {
    pub fn all() -> &'static [OutputFormat] {
        &[OutputFormat::Xml, OutputFormat::Csv]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Xml => "WordPress XML (WXR)",
            Self::Csv => "CSV summary",
        }
    }

    fn suffix<'c>(&self, config: &'c OutputConfig) -> &'c str {
        match self {
            Self::Xml => &config.xml_suffix,
            Self::Csv => &config.csv_suffix,
        }
    }
}

/// `posts.xml` -> `posts-categorized.xml` next to the input.
pub fn default_output_path(input: &Path, format: OutputFormat, config: &OutputConfig) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "export".to_string());
    input.with_file_name(format!("{}{}", stem, format.suffix(config)))
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// CSV rows for every categorized post: `"id","title","slug|slug"`.
///
/// Posts without categories are omitted.
pub fn render_table(posts: &[Post]) -> String {
    let mut out = String::from("\"id\",\"title\",\"categories\"\n");
    for post in posts.iter().filter(|p| p.is_categorized()) {
        let slugs: Vec<&str> = post.categories.iter().map(|c| c.slug.as_str()).collect();
        out.push_str(&format!(
            "{},{},{}\n",
            quote(&post.id),
            quote(&post.title),
            quote(&slugs.join("|"))
        ));
    }
    out
}

/// One output to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub format: OutputFormat,
    pub path: PathBuf,
}

/// Write each target in order. Files already written stay on disk if a later
/// one fails.
pub fn write_outputs(export: &Export, targets: &[OutputTarget]) -> Result<()> {
    for target in targets {
        let content = match target.format {
            OutputFormat::Xml => export.to_xml()?,
            OutputFormat::Csv => render_table(export.posts()),
        };
        if let Some(parent) = target.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target.path, content)?;
        info!(path = %target.path.display(), format = ?target.format, "wrote output");
    }
    Ok(())
}
