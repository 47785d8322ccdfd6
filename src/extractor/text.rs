//! DOM subtree to ordered text fragments and markdown.
//!
//! Anchors are attached to fragments by text equality: each `<a href>`
//! links the first fragment with identical text that has no link yet. With
//! duplicate text this may pick the wrong occurrence; that is accepted.

use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

use crate::article::{RichMedia, clean_text, media::parse_dimension_str};

static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static BLOCK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("p, h1, h2, h3, h4, h5, h6, li, blockquote, figcaption, pre, img").unwrap()
});

const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg", "iframe"];
const IMAGE_SOURCE_ATTRIBUTES: &[&str] = &["src", "data-src", "data-original"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment {
    pub text: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Vec<TextFragment>),
    Heading(u8, Vec<TextFragment>),
    ListItem(Vec<TextFragment>),
    Quote(Vec<TextFragment>),
    Preformatted(String),
    Image(RichMedia),
}

/// Blocks in document order plus every image found under the root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
    pub blocks: Vec<Block>,
    pub images: Vec<RichMedia>,
}

impl Body {
    pub fn markdown(&self) -> String {
        render_markdown(&self.blocks)
    }
}

/// Visible text under `root` as `{text, link?}` fragments.
pub fn text_fragments(root: ElementRef<'_>, denylist: &[String], base: &Url) -> Vec<TextFragment> {
    let mut texts = Vec::new();
    collect_text(root, &mut texts);

    let mut fragments: Vec<TextFragment> = texts
        .into_iter()
        .filter(|text| !denylist.iter().any(|deny| deny == text))
        .map(|text| TextFragment { text, link: None })
        .collect();

    for anchor in root.select(&ANCHOR_SELECTOR) {
        let Some(text) = clean_text(&anchor.text().collect::<String>()) else {
            continue;
        };
        let Some(href) = anchor.value().attr("href").and_then(|href| resolve_href(base, href)) else {
            continue;
        };
        if let Some(fragment) = fragments
            .iter_mut()
            .find(|fragment| fragment.link.is_none() && fragment.text == text)
        {
            fragment.link = Some(href);
        }
    }

    fragments
}

fn collect_text(element: ElementRef<'_>, out: &mut Vec<String>) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            if let Some(text) = clean_text(text) {
                out.push(text);
            }
        } else if let Some(child) = ElementRef::wrap(child)
            && !SKIP_TAGS.contains(&child.value().name())
        {
            collect_text(child, out);
        }
    }
}

fn resolve_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.to_ascii_lowercase().starts_with("javascript:") {
        return None;
    }
    base.join(href).ok().map(String::from)
}

fn image_from(element: ElementRef<'_>, base: &Url) -> Option<RichMedia> {
    let element = element.value();
    let src = IMAGE_SOURCE_ATTRIBUTES
        .iter()
        .filter_map(|attr| element.attr(attr))
        .map(str::trim)
        .find(|src| !src.is_empty() && !src.starts_with("data:"))?;
    let url = base.join(src).ok()?;
    Some(
        RichMedia::new(url.as_str())?
            .with_dimensions(
                element.attr("width").and_then(parse_dimension_str),
                element.attr("height").and_then(parse_dimension_str),
            )
            .with_alt(element.attr("alt")),
    )
}

/// Split `root` into markdown-ready blocks.
///
/// Blocks nested inside an already selected block are folded into it.
/// When the subtree has no block elements at all its whole text becomes a
/// single paragraph.
pub fn extract_body(root: ElementRef<'_>, denylist: &[String], base: &Url) -> Body {
    let mut body = Body::default();
    let mut selected = HashSet::new();

    for element in root.select(&BLOCK_SELECTOR) {
        let nested = element.ancestors().any(|ancestor| selected.contains(&ancestor.id()));
        let name = element.value().name();

        if name == "img" {
            if let Some(image) = image_from(element, base) {
                if !nested {
                    body.blocks.push(Block::Image(image.clone()));
                }
                body.images.push(image);
            }
            continue;
        }
        if nested {
            continue;
        }
        selected.insert(element.id());

        let block = match name {
            "pre" => {
                let code = element.text().collect::<String>();
                let code = code.trim_matches('\n');
                if code.trim().is_empty() {
                    continue;
                }
                Block::Preformatted(code.to_string())
            }
            _ => {
                let fragments = text_fragments(element, denylist, base);
                if fragments.is_empty() {
                    continue;
                }
                match name {
                    "li" => Block::ListItem(fragments),
                    "blockquote" => Block::Quote(fragments),
                    heading if heading.len() == 2 && heading.starts_with('h') => {
                        let level = heading[1..].parse::<u8>().unwrap_or(2);
                        Block::Heading(level, fragments)
                    }
                    _ => Block::Paragraph(fragments),
                }
            }
        };
        body.blocks.push(block);
    }

    if !body.blocks.iter().any(|block| !matches!(block, Block::Image(_))) {
        let fragments = text_fragments(root, denylist, base);
        if !fragments.is_empty() {
            body.blocks.insert(0, Block::Paragraph(fragments));
        }
    }

    body
}

fn escape_text(text: &str) -> String {
    // "1990. Text" would otherwise open an ordered list.
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    let list_delimiter = (1..=9)
        .contains(&digits)
        .then_some(digits)
        .filter(|&at| matches!(text.as_bytes().get(at), Some(b'.' | b')')));

    let mut escaped = String::with_capacity(text.len());
    for (index, ch) in text.chars().enumerate() {
        let leading_marker = index == 0 && matches!(ch, '#' | '-' | '+' | '=');
        let delimiter = list_delimiter == Some(index);
        if leading_marker
            || delimiter
            || matches!(ch, '\\' | '`' | '*' | '_' | '[' | ']' | '<' | '>' | '|')
        {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn escape_url(url: &str) -> String {
    url.replace(' ', "%20").replace('(', "%28").replace(')', "%29")
}

fn render_fragments(fragments: &[TextFragment]) -> String {
    let mut out = String::new();
    for fragment in fragments {
        let piece = match &fragment.link {
            Some(link) => format!("[{}]({})", escape_text(&fragment.text), escape_url(link)),
            None => escape_text(&fragment.text),
        };
        let attaches = fragment.link.is_none()
            && fragment
                .text
                .starts_with(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | ')'));
        if !out.is_empty() && !attaches {
            out.push(' ');
        }
        out.push_str(&piece);
    }
    out
}

/// Render blocks as markdown, one blank line between blocks.
pub fn render_markdown(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|block| match block {
            Block::Paragraph(fragments) => render_fragments(fragments),
            Block::Heading(level, fragments) => format!(
                "{} {}",
                "#".repeat(usize::from((*level).clamp(1, 6))),
                render_fragments(fragments)
            ),
            Block::ListItem(fragments) => format!("- {}", render_fragments(fragments)),
            Block::Quote(fragments) => format!("> {}", render_fragments(fragments)),
            Block::Preformatted(code) => {
                let fence = if code.contains("```") { "~~~~" } else { "```" };
                format!("{fence}\n{code}\n{fence}")
            }
            Block::Image(image) => format!(
                "![{}]({})",
                image.alt.as_deref().map(escape_text).unwrap_or_default(),
                escape_url(&image.url)
            ),
        })
        .filter(|rendered| !rendered.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
