//! Post-processing: deterministic cleanup of model-generated Markdown.
//!
//! ## Why is post-processing necessary?
//!
//! Even well-prompted models occasionally produce output that is fine from
//! the model's point of view but structurally wrong for a document:
//!
//! - wrapping the page in ` ```markdown ... ``` ` despite being told not to,
//!   or opening such a fence and running out of tokens before closing it
//! - inventing `![figure](image.png)` links to files that do not exist
//! - Windows `\r\n` line endings, zero-width spaces, stray BOMs
//! - tables with a missing header separator, or extra separators in the body
//! - (small local models) the same paragraph emitted two or three times
//!
//! Each rule is a pure `&str → String` pass. Markdown that is already
//! well-formed passes through every rule unchanged.
//!
//! ## Rule Order
//!
//! Fences are stripped before anything else so the remaining rules see the
//! page body; line endings are normalised before any line-based rule; the
//! final trim runs last. Line-based rules skip fenced code blocks, whose
//! content is reproduced verbatim.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to one page of model output.
///
/// Rules (applied in order):
/// 1. Strip an outer ```` ```markdown ```` fence (also a dangling opener)
/// 2. Normalise line endings (CRLF / CR → LF)
/// 3. Trim trailing whitespace per line, keeping hard line breaks
/// 4. Collapse runs of blank lines to a single blank line
/// 5. Ensure a blank line before headings (outside code fences)
/// 6. Insert a missing separator row under a table header
/// 7. Remove separator rows inside table bodies
/// 8. Replace placeholder image links with their italic alt text
/// 9. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 10. Trim leading and trailing blank space of the fragment
pub fn clean_markdown(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = normalise_heading_spacing(&s);
    let s = fix_broken_tables(&s);
    let s = remove_mid_table_separators(&s);
    let s = remove_hallucinated_images(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

/// Remove repetition loops typical of small local models: consecutive
/// duplicate lines, then any paragraph already seen earlier on the page
/// (compared case-insensitively). Fenced code is left alone.
pub fn dedupe_repetitions(input: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut in_fence = false;
    for line in input.lines() {
        if is_fence_line(line) {
            in_fence = !in_fence;
        }
        let repeated = !in_fence
            && !line.trim().is_empty()
            && lines
                .last()
                .is_some_and(|prev| prev.trim() == line.trim());
        if !repeated {
            lines.push(line);
        }
    }

    let mut seen = std::collections::HashSet::new();
    let mut paragraphs: Vec<String> = Vec::new();
    for para in split_paragraphs(&lines) {
        let key = para.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        if key.starts_with("```") || seen.insert(key) {
            paragraphs.push(para);
        }
    }
    paragraphs.join("\n\n")
}

/// Split lines into blank-line separated blocks, keeping fenced code blocks
/// whole even when they contain blank lines.
fn split_paragraphs(lines: &[&str]) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut in_fence = false;
    for line in lines {
        if is_fence_line(line) {
            in_fence = !in_fence;
        }
        if !in_fence && line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

fn is_fence_line(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// For each line, whether it is a fence delimiter or inside a fenced block.
fn fenced_lines(lines: &[&str]) -> Vec<bool> {
    let mut in_fence = false;
    lines
        .iter()
        .map(|line| {
            if is_fence_line(line) {
                in_fence = !in_fence;
                true
            } else {
                in_fence
            }
        })
        .collect()
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

fn strip_markdown_fences(input: &str) -> String {
    let trimmed = input.trim();
    let Some(first_line_end) = trimmed.find('\n') else {
        return input.to_string();
    };
    let opener = trimmed[..first_line_end].trim().to_lowercase();
    let tagged = opener == "```markdown" || opener == "```md";
    if !tagged && opener != "```" {
        return input.to_string();
    }

    let body = &trimmed[first_line_end + 1..];
    match body.trim_end().strip_suffix("```") {
        Some(inner) => inner.trim_end().to_string(),
        // An opener with no closer: the model ran out of tokens mid-fence.
        None if tagged => body.to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

/// Two or more trailing spaces before a non-blank line are a hard line
/// break and stay.
fn trim_trailing_whitespace(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let fenced = fenced_lines(&lines);
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let next_has_text = lines.get(i + 1).is_some_and(|n| !n.trim().is_empty());
            if fenced[i] || (is_hard_break(line) && next_has_text) {
                *line
            } else {
                line.trim_end()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_hard_break(line: &str) -> bool {
    !line.trim().is_empty() && line.ends_with("  ")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

fn collapse_blank_lines(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let fenced = fenced_lines(&lines);
    let mut result: Vec<&str> = Vec::with_capacity(lines.len());
    let mut prev_blank = false;
    for (line, in_fence) in lines.iter().zip(fenced) {
        let blank = !in_fence && line.trim().is_empty();
        if !(blank && prev_blank) {
            result.push(*line);
        }
        prev_blank = blank;
    }
    result.join("\n")
}

// ── Rule 5: Normalise heading spacing ────────────────────────────────────────

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes)
        && line[hashes..]
            .chars()
            .next()
            .is_none_or(|c| c == ' ' || c == '\t')
}

fn normalise_heading_spacing(input: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut in_fence = false;
    for line in input.lines() {
        if is_fence_line(line) {
            in_fence = !in_fence;
        }
        if !in_fence && is_heading(line) {
            if let Some(prev) = result.last() {
                if !prev.trim().is_empty() {
                    result.push("");
                }
            }
        }
        result.push(line);
    }
    result.join("\n")
}

// ── Rule 6: Fix broken GFM tables ───────────────────────────────────────────

/// A table whose first row is not followed by a separator row gets one.
fn fix_broken_tables(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let fenced = fenced_lines(&lines);
    let mut result: Vec<String> = Vec::with_capacity(lines.len() + 4);

    for (i, line) in lines.iter().enumerate() {
        result.push(line.to_string());

        let starts_table = !fenced[i]
            && is_table_row(line)
            && !is_separator_row(line)
            && (i == 0 || !is_table_row(lines[i - 1]));
        if !starts_table {
            continue;
        }
        let next = lines.get(i + 1).copied().unwrap_or("");
        if is_table_row(next) && !is_separator_row(next) {
            let col_count = line.trim().matches('|').count().saturating_sub(1).max(1);
            let sep: String = std::iter::once("|")
                .chain(std::iter::repeat_n(" --- |", col_count))
                .collect();
            result.push(sep);
        }
    }

    result.join("\n")
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

// ── Rule 7: Remove spurious mid-table separator rows ───────────────────────
//
// GFM only allows a separator as the second row of a table. Extra
// separators in the body split the table in some renderers.

fn remove_mid_table_separators(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let fenced = fenced_lines(&lines);
    let mut result: Vec<&str> = Vec::with_capacity(lines.len());
    let mut table_line_count = 0usize;

    for (line, in_fence) in lines.iter().zip(fenced) {
        if !in_fence && is_table_row(line) {
            table_line_count += 1;
            if is_separator_row(line) && table_line_count != 2 {
                continue;
            }
        } else {
            table_line_count = 0;
        }
        result.push(*line);
    }

    result.join("\n")
}

// ── Rule 8: Remove hallucinated image links ───────────────────────────────────
//
// A page image has no embedded files the Markdown could link to, so a
// relative or placeholder URL is always invented. Keep `![alt](url)` only for
// absolute http(s) URLs on a non-placeholder host; otherwise keep the alt
// text as an italic caption.

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

fn is_placeholder_url(url: &str) -> bool {
    let u = url.trim();
    if !u.starts_with("http://") && !u.starts_with("https://") {
        return true;
    }
    const FAKE_DOMAINS: [&str; 7] = [
        "example.com",
        "placeholder.com",
        "via.placeholder.com",
        "dummyimage.com",
        "lorempixel.com",
        "picsum.photos",
        "placehold.it",
    ];
    FAKE_DOMAINS.iter().any(|d| u.contains(d))
}

fn remove_hallucinated_images(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let fenced = fenced_lines(&lines);
    lines
        .iter()
        .zip(fenced)
        .map(|(line, in_fence)| {
            if in_fence {
                return line.to_string();
            }
            RE_IMAGE
                .replace_all(line, |caps: &regex::Captures<'_>| {
                    let alt = caps[1].trim();
                    if !is_placeholder_url(&caps[2]) {
                        caps[0].to_string()
                    } else if alt.is_empty() {
                        String::new()
                    } else {
                        format!("*{}*", alt)
                    }
                })
                .into_owned()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 9: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Tests ────────────────────────────────────────────────────────────────────
