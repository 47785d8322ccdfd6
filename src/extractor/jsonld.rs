//! `application/ld+json` blocks.
//!
//! Every block (and every node of an `@graph` or top-level array) that
//! carries a recognised key is applied in document order, so later nodes
//! overwrite earlier ones field by field.

use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::article::{
    Article, Author,
    authors::split_byline,
    media::{RichMedia, parse_dimension},
    time::parse_timestamp_value,
};

static LD_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// Node types that usually describe the page around the article. They are
/// still merged when they carry one of the [`STORY_KEYS`].
const SKIPPED_TYPES: &[&str] = &[
    "Organization",
    "NewsMediaOrganization",
    "WebSite",
    "WebPage",
    "BreadcrumbList",
    "Person",
    "SiteNavigationElement",
    "ImageObject",
    "VideoObject",
];

const ORGANISATION_TYPES: &[&str] = &["Organization", "NewsMediaOrganization"];

const ARTICLE_KEYS: &[&str] = &[
    "author",
    "datePublished",
    "dateModified",
    "publisher",
    "url",
    "mainEntityOfPage",
    "image",
    "headline",
    "description",
    "keywords",
    "articleSection",
];

/// Keys only an article node carries.
const STORY_KEYS: &[&str] = &["headline", "datePublished", "dateModified", "articleBody"];

/// Maximum nesting of arrays and `@graph` containers that is followed.
const MAX_DEPTH: usize = 8;

/// Apply every JSON-LD block of the document. Returns the number of nodes
/// that contributed.
pub fn apply_json_ld(article: &mut Article, document: &Html, base: &Url) -> usize {
    let mut applied = 0;
    for script in document.select(&LD_SELECTOR) {
        let raw = script.text().collect::<String>();
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&raw.replace("\\/", "/")) {
            Ok(value) => applied += apply_value(article, &value, base, 0),
            Err(err) => debug!(url = %base, error = %err, "skipping invalid JSON-LD block"),
        }
    }
    applied
}

fn apply_value(article: &mut Article, value: &Value, base: &Url, depth: usize) -> usize {
    if depth > MAX_DEPTH {
        return 0;
    }
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| apply_value(article, item, base, depth + 1))
            .sum(),
        Value::Object(node) => {
            let mut applied = node
                .get("@graph")
                .map(|graph| apply_value(article, graph, base, depth + 1))
                .unwrap_or(0);
            if is_article_node(node) {
                apply_node(article, node, base);
                applied += 1;
            }
            applied
        }
        _ => 0,
    }
}

fn is_article_node(node: &Map<String, Value>) -> bool {
    let has_any = |keys: &[&str]| keys.iter().any(|key| node.contains_key(*key));
    has_any(ARTICLE_KEYS) && (has_any(STORY_KEYS) || !has_type(node, SKIPPED_TYPES))
}

fn node_types(node: &Map<String, Value>) -> Vec<&str> {
    match node.get("@type") {
        Some(Value::String(kind)) => vec![kind.as_str()],
        Some(Value::Array(kinds)) => kinds.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn has_type(node: &Map<String, Value>, types: &[&str]) -> bool {
    node_types(node).iter().any(|kind| types.contains(kind))
}

pub(crate) fn absolute_url(base: &Url, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    base.join(value)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(String::from)
}

pub(crate) fn first_str(value: &Value) -> Option<&str> {
    match value {
        Value::String(text) => Some(text.as_str()),
        Value::Array(items) => items.iter().find_map(Value::as_str),
        _ => None,
    }
}

fn apply_node(article: &mut Article, node: &Map<String, Value>, base: &Url) {
    if let Some(author) = node.get("author") {
        article.replace_authors(parse_authors(author, base));
    }
    if let Some(published) = node.get("datePublished") {
        article.set_published(parse_timestamp_value(published));
    }
    if let Some(modified) = node.get("dateModified") {
        article.set_modified(parse_timestamp_value(modified));
    }
    match node.get("publisher") {
        Some(Value::Object(publisher)) => {
            if let Some(name) = publisher.get("name").and_then(Value::as_str) {
                article.set_organisation(name);
            }
        }
        Some(Value::String(name)) => article.set_organisation(name),
        _ => {}
    }

    let canonical = node.get("url").and_then(Value::as_str).or_else(|| {
        match node.get("mainEntityOfPage") {
            Some(Value::String(url)) => Some(url.as_str()),
            Some(Value::Object(entity)) => entity.get("@id").and_then(Value::as_str),
            _ => None,
        }
    });
    if let Some(url) = canonical.and_then(|url| absolute_url(base, url)) {
        article.set_url(&url);
    }

    if let Some(images) = node.get("image") {
        let mut images = parse_images(images, base).into_iter();
        if let Some(thumbnail) = images.next() {
            article.set_thumbnail(thumbnail);
        }
        images.for_each(|image| article.add_image(image));
    }

    if let Some(headline) = node.get("headline").and_then(Value::as_str) {
        article.set_title(headline);
    }
    if let Some(description) = node.get("description").and_then(Value::as_str) {
        article.set_description(description);
    }
    match node.get("keywords") {
        Some(Value::String(keywords)) => keywords.split(',').for_each(|tag| article.add_tag(tag)),
        Some(Value::Array(keywords)) => keywords
            .iter()
            .filter_map(Value::as_str)
            .for_each(|tag| article.add_tag(tag)),
        _ => {}
    }
    if let Some(section) = node.get("articleSection").and_then(first_str) {
        article.set_genre(section);
    }
}

/// Authors from a string, a typed object or a list of either.
/// Organisation-typed entries never become authors.
pub fn parse_authors(value: &Value, base: &Url) -> Vec<Author> {
    match value {
        Value::String(byline) => split_byline(byline)
            .iter()
            .filter_map(|name| Author::named(name))
            .collect(),
        Value::Array(items) => items.iter().flat_map(|item| parse_authors(item, base)).collect(),
        Value::Object(node) if has_type(node, ORGANISATION_TYPES) => Vec::new(),
        Value::Object(node) => {
            let mut author = node
                .get("name")
                .and_then(Value::as_str)
                .and_then(Author::named)
                .unwrap_or_default();
            author.url = node
                .get("url")
                .and_then(Value::as_str)
                .and_then(|url| absolute_url(base, url));
            author.email = node
                .get("email")
                .and_then(Value::as_str)
                .map(|email| email.trim().trim_start_matches("mailto:").to_string())
                .filter(|email| !email.is_empty());
            author.twitter_url = node.get("sameAs").and_then(|same_as| {
                let links: Vec<&str> = match same_as {
                    Value::String(link) => vec![link.as_str()],
                    Value::Array(links) => links.iter().filter_map(Value::as_str).collect(),
                    _ => Vec::new(),
                };
                links
                    .into_iter()
                    .filter_map(|link| absolute_url(base, link))
                    .find(|link| is_twitter_profile(link))
            });
            author.image = node
                .get("image")
                .and_then(|image| parse_images(image, base).into_iter().next());
            if author.is_identifiable() {
                vec![author]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

fn is_twitter_profile(link: &str) -> bool {
    Url::parse(link)
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| matches!(host.as_str(), "twitter.com" | "www.twitter.com" | "x.com" | "www.x.com"))
}

/// Images from a url string, an `ImageObject`, or a list of either.
pub fn parse_images(value: &Value, base: &Url) -> Vec<RichMedia> {
    match value {
        Value::String(url) => absolute_url(base, url)
            .and_then(RichMedia::new)
            .into_iter()
            .collect(),
        Value::Array(items) => items.iter().flat_map(|item| parse_images(item, base)).collect(),
        Value::Object(node) => node
            .get("url")
            .or_else(|| node.get("contentUrl"))
            .and_then(Value::as_str)
            .and_then(|url| absolute_url(base, url))
            .and_then(RichMedia::new)
            .map(|image| {
                image
                    .with_dimensions(
                        node.get("width").and_then(parse_dimension),
                        node.get("height").and_then(parse_dimension),
                    )
                    .with_alt(node.get("caption").and_then(Value::as_str))
                    .with_mime_type(node.get("encodingFormat").and_then(Value::as_str))
            })
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://news.example.com/2024/05/01/story").unwrap()
    }

    fn apply(blocks: &[&str]) -> Article {
        let scripts: String = blocks
            .iter()
            .map(|block| format!(r#"<script type="application/ld+json">{block}</script>"#))
            .collect();
        let document = Html::parse_document(&format!("<html><head>{scripts}</head><body></body></html>"));
        let mut article = Article::default();
        apply_json_ld(&mut article, &document, &base());
        article
    }

    #[test]
    fn test_organisation_authors_excluded() {
        let article = apply(&[r#"{"@type":"NewsArticle","author":[
            {"@type":"Organization","name":"Example News"},
            {"@type":"Person","name":"Jane Doe"}]}"#]);
        assert_eq!(article.authors.len(), 1);
        assert_eq!(article.authors[0].name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_article_fields() {
        let article = apply(&[r#"{
            "@context": "https://schema.org",
            "@type": "NewsArticle",
            "headline": "Council approves budget",
            "description": "The vote was close.",
            "datePublished": "2024-05-01T08:00:00+00:00",
            "dateModified": "2024-05-01T09:30:00Z",
            "publisher": {"@type": "Organization", "name": "Example News"},
            "mainEntityOfPage": {"@id": "https:\/\/news.example.com\/budget"},
            "image": [
                {"@type": "ImageObject", "url": "/img/lead.jpg", "width": "1200px", "height": 800},
                "https://cdn.example.com/second.jpg"
            ],
            "keywords": "council, budget",
            "articleSection": ["Local", "Politics"]
        }"#]);
        assert_eq!(article.info.title.as_deref(), Some("Council approves budget"));
        assert_eq!(article.info.description.as_deref(), Some("The vote was close."));
        assert_eq!(article.time.published, Some(1_714_550_400));
        assert_eq!(article.time.modified, Some(1_714_555_800));
        assert_eq!(article.publisher.organisation.as_deref(), Some("Example News"));
        assert_eq!(article.info.url.as_deref(), Some("https://news.example.com/budget"));
        assert_eq!(article.info.genre.as_deref(), Some("Local"));

        let thumbnail = article.images.thumbnail.as_ref().unwrap();
        assert_eq!(thumbnail.url, "https://news.example.com/img/lead.jpg");
        assert_eq!(thumbnail.width, Some(1200));
        assert_eq!(thumbnail.height, Some(800));
        assert_eq!(article.images.images.len(), 1);
        assert!(article.tags.contains("council"));
        assert!(article.tags.contains("budget"));
    }

    #[test]
    fn test_graph_and_skipped_nodes() {
        let article = apply(&[r#"{"@context":"https://schema.org","@graph":[
            {"@type":"WebSite","url":"https://news.example.com/","description":"Site tagline"},
            {"@type":"Article","headline":"From graph","author":"By Jane Doe and John Roe"},
            {"@type":"BreadcrumbList","itemListElement":[]}
        ]}"#]);
        assert_eq!(article.info.title.as_deref(), Some("From graph"));
        assert!(article.info.description.is_none());
        assert!(article.info.url.is_none());
        let names: Vec<_> = article.authors.iter().filter_map(|a| a.name.as_deref()).collect();
        assert_eq!(names, vec!["Jane Doe", "John Roe"]);
    }

    #[test]
    fn test_page_nodes_with_story_keys_are_merged() {
        let article = apply(&[r#"{"@graph":[
            {"@type":"WebPage","headline":"Typed as a page","datePublished":"2024-05-01T08:00:00Z",
             "description":"Page summary"},
            {"@type":"Person","name":"Jane Doe","url":"https://news.example.com/by/jane"}
        ]}"#]);
        assert_eq!(article.info.title.as_deref(), Some("Typed as a page"));
        assert_eq!(article.info.description.as_deref(), Some("Page summary"));
        assert_eq!(article.time.published, Some(1_714_550_400));
        assert!(article.info.url.is_none());
    }

    #[test]
    fn test_later_blocks_overwrite_per_field() {
        let article = apply(&[
            r#"{"@type":"NewsArticle","headline":"First","description":"Kept"}"#,
            r#"{"@type":"NewsArticle","headline":"Second"}"#,
        ]);
        assert_eq!(article.info.title.as_deref(), Some("Second"));
        assert_eq!(article.info.description.as_deref(), Some("Kept"));
    }

    #[test]
    fn test_invalid_blocks_are_skipped() {
        let article = apply(&[
            r#"{"@type":"NewsArticle","headline":"#,
            r#"{"@type":"NewsArticle","headline":"Valid"}"#,
        ]);
        assert_eq!(article.info.title.as_deref(), Some("Valid"));
    }

    #[test]
    fn test_person_details() {
        let authors = parse_authors(
            &serde_json::json!({
                "@type": "Person",
                "name": "Jane Doe",
                "url": "/by/jane-doe",
                "email": "mailto:jane@example.com",
                "sameAs": ["https://www.linkedin.com/in/jane", "https://twitter.com/janedoe"],
                "image": {"url": "https://cdn.example.com/jane.jpg"}
            }),
            &base(),
        );
        let author = &authors[0];
        assert_eq!(author.url.as_deref(), Some("https://news.example.com/by/jane-doe"));
        assert_eq!(author.email.as_deref(), Some("jane@example.com"));
        assert_eq!(author.twitter_url.as_deref(), Some("https://twitter.com/janedoe"));
        assert_eq!(
            author.image.as_ref().map(|i| i.url.as_str()),
            Some("https://cdn.example.com/jane.jpg")
        );
    }
}
