use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use regex::Regex;
use std::sync::LazyLock;

static SPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());
static BLANK_LINES_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Render markdown and keep only the visible text. Code spans, code blocks
/// and image alt text are excluded; raw HTML tags are stripped.
pub fn markdown_to_plaintext(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());
    let mut code_depth = 0usize;
    let mut image_depth = 0usize;

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::CodeBlock(_)) => code_depth += 1,
            Event::End(TagEnd::CodeBlock) => code_depth = code_depth.saturating_sub(1),
            Event::Start(Tag::Image { .. }) => image_depth += 1,
            Event::End(TagEnd::Image) => image_depth = image_depth.saturating_sub(1),
            Event::Text(text) if code_depth == 0 && image_depth == 0 => out.push_str(&text),
            Event::SoftBreak | Event::HardBreak if code_depth == 0 => out.push('\n'),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item) => {
                out.push_str("\n\n")
            }
            _ => {}
        }
    }

    normalize_whitespace(&out)
}

/// Collapse runs of spaces, trim every line and keep at most one blank line
/// between paragraphs.
pub fn normalize_whitespace(text: &str) -> String {
    let spaced = SPACE_REGEX.replace_all(text, " ");
    let trimmed_lines = spaced
        .lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n");
    BLANK_LINES_REGEX
        .replace_all(trimmed_lines.trim(), "\n\n")
        .to_string()
}
