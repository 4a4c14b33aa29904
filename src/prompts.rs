//! Prompts for vision-model page transcription.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: changing the default behaviour (a new rule,
//!    different table handling) means editing exactly one place.
//!
//! 2. **Testability**: unit tests inspect prompts directly without a model,
//!    so prompt regressions are easy to catch.
//!
//! [`build_prompt`] is a pure function of its arguments: the same page,
//! total, hints and style always produce the same request text.

/// How much instruction to give the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptStyle {
    /// Full rule list with an output example. Suits large hosted models.
    #[default]
    Detailed,
    /// Short, literal instructions. Small local models follow these better
    /// and are less prone to inventing content.
    Compact,
}

/// The text half of a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Default system prompt for hosted models.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a document transcriber that converts an image of one document page into clean, well-structured Markdown. Output the Markdown content only, without any other text.";

/// System prompt for small local models.
pub const COMPACT_SYSTEM_PROMPT: &str = "You are a document transcriber. Read the text in the image and transcribe it EXACTLY as shown. Do not add, change, or invent any content. Only transcribe what you actually see.";

const DETAILED_RULES: &str = r#"Transcribe the content of the attached image into Markdown. Follow these rules precisely:

1. Preserve ALL text in natural reading order. Do not summarise.
2. Reproduce heading levels (#, ##, ###), lists, bold and italic emphasis.
3. Convert tables to Markdown pipe tables with a header separator row.
4. Transcribe mathematical formulas as LaTeX: $inline$ and $$display$$.
5. DO NOT emit image references such as ![alt](url) or <img> tags.
6. Describe figures, charts and diagrams in text instead, as:
   **Chart Description:** <what the figure shows>
7. Skip page numbers and running headers or footers.
8. Output ONLY the Markdown. No commentary, and no ```markdown fences.

Output example:

# Document Title

Regular paragraph text here.

**Chart Description:** Bar chart of yearly sales from 2020 to 2023, rising each year.

| Column 1 | Column 2 |
| --- | --- |
| Data 1 | Data 2 |

Mathematical formula: $E = mc^2$"#;

const COMPACT_RULES: &str = r#"Read the text in this image and format it as Markdown.

Rules:
- Only write what you actually see
- Use # for big titles and ## for section headers
- Use **text** for bold
- Use | tables | like | this |
- Describe pictures in words, never as image links
- Don't make up any information"#;

/// Build the prompt for one page.
///
/// `page_num` is the 1-based ordinal in the source document; `total_pages`
/// is the document's page count. `system_override` replaces the built-in
/// system text but never the per-page user instruction.
pub fn build_prompt(
    page_num: usize,
    total_pages: usize,
    hints: Option<&str>,
    style: PromptStyle,
    system_override: Option<&str>,
) -> Prompt {
    let (default_system, rules) = match style {
        PromptStyle::Detailed => (DEFAULT_SYSTEM_PROMPT, DETAILED_RULES),
        PromptStyle::Compact => (COMPACT_SYSTEM_PROMPT, COMPACT_RULES),
    };

    let system = system_override
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default_system)
        .to_string();

    let mut user = format!("This image is page {} of {}.\n\n{}", page_num, total_pages, rules);

    if let Some(hints) = hints.map(str::trim).filter(|h| !h.is_empty()) {
        user.push_str("\n\nAdditional instructions:\n");
        user.push_str(hints);
    }

    if style == PromptStyle::Compact {
        user.push_str("\n\nStart transcribing:");
    }

    Prompt { system, user }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = build_prompt(2, 5, Some("keep footnotes"), PromptStyle::Detailed, None);
        let b = build_prompt(2, 5, Some("keep footnotes"), PromptStyle::Detailed, None);
        assert_eq!(a, b);
    }

    #[test]
    fn mentions_page_position() {
        let p = build_prompt(3, 7, None, PromptStyle::Detailed, None);
        assert!(p.user.starts_with("This image is page 3 of 7."));
    }

    #[test]
    fn detailed_rules_cover_structure() {
        let p = build_prompt(1, 1, None, PromptStyle::Detailed, None);
        for needle in ["LaTeX", "pipe tables", "heading", "Chart Description", "ONLY the Markdown"] {
            assert!(p.user.contains(needle), "missing {needle:?}");
        }
        assert!(p.user.contains("DO NOT emit image references"));
        assert_eq!(p.system, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn hints_appended() {
        let p = build_prompt(1, 1, Some("  German text  "), PromptStyle::Detailed, None);
        assert!(p.user.ends_with("Additional instructions:\nGerman text"));
        let blank = build_prompt(1, 1, Some("   "), PromptStyle::Detailed, None);
        assert!(!blank.user.contains("Additional instructions"));
    }

    #[test]
    fn compact_style() {
        let p = build_prompt(1, 2, None, PromptStyle::Compact, None);
        assert_eq!(p.system, COMPACT_SYSTEM_PROMPT);
        assert!(p.user.contains("Don't make up any information"));
        assert!(p.user.ends_with("Start transcribing:"));
    }

    #[test]
    fn system_override_replaces_system_only() {
        let p = build_prompt(4, 9, None, PromptStyle::Detailed, Some("Be terse."));
        assert_eq!(p.system, "Be terse.");
        assert!(p.user.contains("page 4 of 9"));

        let empty = build_prompt(4, 9, None, PromptStyle::Detailed, Some(""));
        assert_eq!(empty.system, DEFAULT_SYSTEM_PROMPT);
    }
}
