//! Response assembly: stitch per-page fragments into one document.
//!
//! Fragments are joined in ascending page order with the configured
//! separator. Nothing is merged or deduplicated across pages: a sentence
//! split over a page break stays split.

use crate::config::PageSeparator;
use crate::output::{DocumentMetadata, PageResult};

/// Join page fragments, optionally under a YAML front-matter block.
///
/// `pages` must already be sorted by `page_num`. Pages with an empty
/// fragment (possible only with `allow_empty_pages`) still get their
/// separator so page comments keep counting correctly.
pub fn assemble_document(
    pages: &[PageResult],
    separator: &PageSeparator,
    metadata: Option<&DocumentMetadata>,
) -> String {
    let mut out = String::new();

    if let Some(meta) = metadata {
        out.push_str(&format_yaml_front_matter(meta));
    }

    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            out.push_str(&separator.render(page.page_num));
        }
        out.push_str(&page.markdown);
    }

    out
}

/// Format document metadata as YAML front matter.
pub fn format_yaml_front_matter(meta: &DocumentMetadata) -> String {
    let mut yaml = String::from("---\n");

    let fields = [
        ("title", &meta.title),
        ("author", &meta.author),
        ("subject", &meta.subject),
        ("creator", &meta.creator),
        ("producer", &meta.producer),
        ("created", &meta.creation_date),
        ("modified", &meta.modification_date),
    ];
    for (key, value) in fields {
        if let Some(v) = value {
            yaml.push_str(&format!("{}: {}\n", key, yaml_string(v)));
        }
    }

    yaml.push_str(&format!("format: {}\n", meta.format));
    yaml.push_str(&format!("pages: {}\n", meta.page_count));
    if !meta.pdf_version.is_empty() {
        yaml.push_str(&format!("pdf_version: {}\n", yaml_string(&meta.pdf_version)));
    }

    yaml.push_str("---\n\n");
    yaml
}

/// Double-quoted YAML scalar.
fn yaml_string(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("\"{}\"", escaped)
}
