//! Walker for flat `id -> node` state tables.
//!
//! Nodes carry a `__typename` discriminator and point at children through
//! `{"id": ...}` references. `Article` nodes hold the times, headline and
//! summary, plus references to `DocumentBlock`s whose content blocks
//! (headings, paragraphs, inline text, images, bylines) make up the body.

use serde_json::{Map, Value};
use std::collections::HashSet;
use url::Url;

use crate::article::{Article, Author, RichMedia, clean_text, time::parse_timestamp_value};
use crate::extractor::jsonld::absolute_url;
use crate::extractor::text::{Block, TextFragment, render_markdown};

const MAX_DEPTH: usize = 64;

type Node = Map<String, Value>;

fn typename(node: &Node) -> Option<&str> {
    node.get("__typename").and_then(Value::as_str)
}

fn ref_id(value: &Value) -> Option<&str> {
    value.as_object()?.get("id")?.as_str()
}

/// Apply every `Article` node that has a publication time.
pub fn apply(article: &mut Article, state: &Value, base: &Url) -> bool {
    let Some(table) = state.as_object() else {
        return false;
    };

    let mut applied = false;
    for node in table
        .values()
        .filter_map(Value::as_object)
        .filter(|node| typename(node) == Some("Article"))
    {
        let Some(published) = node.get("firstPublished").and_then(parse_timestamp_value) else {
            continue;
        };
        applied = true;
        article.set_published(Some(published));
        article.set_modified(node.get("lastModified").and_then(parse_timestamp_value));

        if let Some(title) = text_field(table, node, &["promotionalHeadline", "headline"]) {
            article.set_title(&title);
        }
        if let Some(summary) = text_field(table, node, &["promotionalSummary", "summary"]) {
            article.set_description(&summary);
        }

        let mut walker = Walker::new(table, base);
        for document in document_refs(table, node) {
            walker.document(document);
        }
        let Walker {
            blocks,
            images,
            authors,
            ..
        } = walker.finish();
        article.set_markdown(render_markdown(&blocks));
        for image in images {
            article.add_image(image);
        }
        article.replace_authors(authors);

        for tag in tag_refs(node) {
            if let Some(vernacular) = table
                .get(tag)
                .and_then(|tag| tag.get("vernacular"))
                .and_then(Value::as_str)
            {
                article.add_tag(vernacular);
            }
        }
    }
    applied
}

/// A string field, or the `default` of the node a reference points at.
fn text_field(table: &Node, node: &Node, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match node.get(*key)? {
        Value::String(text) => clean_text(text),
        reference => table
            .get(ref_id(reference)?)?
            .get("default")
            .and_then(Value::as_str)
            .and_then(clean_text),
    })
}

fn document_refs<'s>(table: &'s Node, node: &'s Node) -> Vec<&'s str> {
    node.values()
        .filter_map(|value| {
            let id = ref_id(value)?;
            let tagged = value.get("typename").and_then(Value::as_str) == Some("DocumentBlock");
            let resolved = table
                .get(id)
                .and_then(Value::as_object)
                .is_some_and(|target| typename(target) == Some("DocumentBlock"));
            (tagged || resolved).then_some(id)
        })
        .collect()
}

fn tag_refs(node: &Node) -> Vec<&str> {
    node.iter()
        .filter(|(key, _)| key.starts_with("timesTags"))
        .filter_map(|(_, value)| value.as_array())
        .flatten()
        .filter_map(ref_id)
        .collect()
}

enum OpenKind {
    Paragraph,
    Heading(u8),
}

struct Walker<'s> {
    table: &'s Node,
    base: &'s Url,
    visited: HashSet<&'s str>,
    open: Option<(OpenKind, Vec<TextFragment>)>,
    blocks: Vec<Block>,
    images: Vec<RichMedia>,
    authors: Vec<Author>,
}

impl<'s> Walker<'s> {
    fn new(table: &'s Node, base: &'s Url) -> Self {
        Self {
            table,
            base,
            visited: HashSet::new(),
            open: None,
            blocks: Vec::new(),
            images: Vec::new(),
            authors: Vec::new(),
        }
    }

    fn node(&self, id: &str) -> Option<&'s Node> {
        self.table.get(id)?.as_object()
    }

    fn document(&mut self, id: &'s str) {
        if !self.visited.insert(id) {
            return;
        }
        let Some(node) = self.node(id) else {
            return;
        };
        for items in node.values().filter_map(Value::as_array) {
            for child in items.iter().filter_map(ref_id) {
                self.walk(child, 1);
            }
        }
    }

    fn walk(&mut self, id: &'s str, depth: usize) {
        if depth > MAX_DEPTH || !self.visited.insert(id) {
            return;
        }
        let Some(node) = self.node(id) else {
            return;
        };

        match typename(node) {
            Some("ParagraphBlock") => self.block(OpenKind::Paragraph, node, depth),
            Some(name) if name.starts_with("Heading") && name.ends_with("Block") => {
                let level = name["Heading".len()..name.len() - "Block".len()]
                    .parse::<u8>()
                    .ok()
                    .filter(|level| (1..=6).contains(level));
                let kind = level.map_or(OpenKind::Paragraph, OpenKind::Heading);
                self.block(kind, node, depth);
            }
            Some("TextInline") => self.text_inline(node),
            Some("Image") => self.image(node),
            Some("Byline") => self.byline(node),
            _ => self.children(node, depth),
        }
    }

    fn children(&mut self, node: &'s Node, depth: usize) {
        for value in node.values() {
            match value {
                Value::Object(_) => {
                    if let Some(id) = ref_id(value) {
                        self.walk(id, depth + 1);
                    }
                }
                Value::Array(items) => {
                    for id in items.iter().filter_map(ref_id) {
                        self.walk(id, depth + 1);
                    }
                }
                _ => {}
            }
        }
    }

    fn block(&mut self, kind: OpenKind, node: &'s Node, depth: usize) {
        self.close();
        self.open = Some((kind, Vec::new()));
        self.children(node, depth);
        self.close();
    }

    fn close(&mut self) {
        let Some((kind, fragments)) = self.open.take() else {
            return;
        };
        if fragments.is_empty() {
            return;
        }
        self.blocks.push(match kind {
            OpenKind::Paragraph => Block::Paragraph(fragments),
            OpenKind::Heading(level) => Block::Heading(level, fragments),
        });
    }

    fn text_inline(&mut self, node: &'s Node) {
        let text: String = node
            .iter()
            .filter(|(key, _)| key.starts_with("text"))
            .filter_map(|(_, value)| value.as_str())
            .collect();
        let Some(text) = clean_text(&text) else {
            return;
        };

        let link = node
            .get("formats")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|format| {
                format.get("typename").and_then(Value::as_str) == Some("LinkFormat")
                    || format.get("__typename").and_then(Value::as_str) == Some("LinkFormat")
            })
            .find_map(|format| {
                let url = match ref_id(format).and_then(|id| self.node(id)) {
                    Some(target) => target.get("url"),
                    None => format.get("url"),
                };
                url.and_then(Value::as_str)
                    .and_then(|url| absolute_url(self.base, url))
            });

        let fragment = TextFragment { text, link };
        match &mut self.open {
            Some((_, fragments)) => fragments.push(fragment),
            None => self.blocks.push(Block::Paragraph(vec![fragment])),
        }
    }

    /// The largest rendition across every crop of the image.
    fn image(&mut self, node: &'s Node) {
        let caption = [node.get("legacyHtmlCaption"), node.get("credit")]
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" ");

        let mut best: Option<(u64, &str, u32, u32)> = None;
        let crops = node
            .iter()
            .filter(|(key, _)| key.starts_with("crops"))
            .filter_map(|(_, value)| value.as_array())
            .flatten()
            .filter_map(|crop| self.node(ref_id(crop)?));
        for crop in crops {
            let renditions = crop
                .get("renditions")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|rendition| self.node(ref_id(rendition)?));
            for rendition in renditions {
                let dimension = |key: &str| {
                    let value = rendition.get(key).and_then(Value::as_u64).unwrap_or(0);
                    u32::try_from(value).ok()
                };
                let (Some(width), Some(height)) = (dimension("width"), dimension("height")) else {
                    continue;
                };
                let Some(url) = rendition.get("url").and_then(Value::as_str) else {
                    continue;
                };
                let area = u64::from(width) * u64::from(height);
                if best.is_none_or(|(best_area, ..)| area > best_area) {
                    best = Some((area, url, width, height));
                }
            }
        }

        let Some((_, url, width, height)) = best else {
            return;
        };
        let Some(image) = absolute_url(self.base, url).and_then(RichMedia::new) else {
            return;
        };
        let image = image
            .with_dimensions(Some(width), Some(height))
            .with_alt(clean_text(&caption).as_deref());
        self.close();
        self.blocks.push(Block::Image(image.clone()));
        self.images.push(image);
    }

    fn byline(&mut self, node: &'s Node) {
        let table = self.table;
        let creators = node
            .get("creators")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|creator| table.get(ref_id(creator)?)?.as_object());
        for person in creators {
            let Some(mut author) = person
                .get("displayName")
                .and_then(Value::as_str)
                .and_then(Author::named)
            else {
                continue;
            };
            author.url = person
                .get("bioUrl")
                .and_then(Value::as_str)
                .and_then(|url| absolute_url(self.base, url));
            self.authors.push(author);
        }
    }

    fn finish(mut self) -> Self {
        self.close();
        self
    }
}
