use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::article::{Article, time::parse_timestamp_value};
use crate::extractor::jsonld::{first_str, parse_authors, parse_images};
use crate::extractor::text::{extract_body, render_markdown};

/// JSON pointers into a state object, one per article field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub organisation: Option<String>,
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub images: Option<String>,
    /// An HTML string or a list of HTML paragraphs.
    #[serde(default)]
    pub body: Option<String>,
}

pub fn apply(article: &mut Article, state: &Value, map: &FieldMap, base: &Url) -> bool {
    let lookup = |pointer: &Option<String>| {
        pointer
            .as_deref()
            .and_then(|pointer| state.pointer(pointer))
            .filter(|value| !value.is_null())
    };
    let mut applied = false;

    let strings: [(&Option<String>, fn(&mut Article, &str)); 5] = [
        (&map.title, Article::set_title),
        (&map.description, Article::set_description),
        (&map.genre, Article::set_genre),
        (&map.url, Article::set_url),
        (&map.organisation, Article::set_organisation),
    ];
    for (pointer, set) in strings {
        if let Some(text) = lookup(pointer).and_then(first_str) {
            set(article, text);
            applied = true;
        }
    }

    if let Some(published) = lookup(&map.published).and_then(parse_timestamp_value) {
        article.set_published(Some(published));
        applied = true;
    }
    if let Some(modified) = lookup(&map.modified).and_then(parse_timestamp_value) {
        article.set_modified(Some(modified));
        applied = true;
    }

    if let Some(value) = lookup(&map.authors) {
        let authors = parse_authors(value, base);
        applied |= !authors.is_empty();
        article.replace_authors(authors);
    }

    if let Some(value) = lookup(&map.tags) {
        let tags: Vec<&str> = match value {
            Value::String(list) => list.split(',').collect(),
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        for tag in tags {
            article.add_tag(tag);
            applied = true;
        }
    }

    if let Some(value) = lookup(&map.images) {
        for image in parse_images(value, base) {
            if article.images.thumbnail.is_none() {
                article.set_thumbnail(image);
            } else {
                article.add_image(image);
            }
            applied = true;
        }
    }

    if let Some(value) = lookup(&map.body) {
        let snippets: Vec<&str> = match value {
            Value::String(html) => vec![html.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        let mut blocks = Vec::new();
        for snippet in snippets {
            let fragment = Html::parse_fragment(snippet);
            let body = extract_body(fragment.root_element(), &[], base);
            blocks.extend(body.blocks);
            for image in body.images {
                article.add_image(image);
            }
        }
        let markdown = render_markdown(&blocks);
        if !markdown.trim().is_empty() {
            article.set_markdown(markdown);
            applied = true;
        }
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("https://www.example.com/news/story").unwrap()
    }

    #[test]
    fn test_pointer_fields() {
        let state = json!({
            "page": {
                "headline": "State headline",
                "standfirst": "Summary",
                "dates": {"published": 1539870072000_i64, "updated": "2018-10-18T15:00:00Z"},
                "authors": [{"name": "Jane Doe"}, {"name": "John Roe", "url": "/john"}],
                "tags": "politics, economy,",
                "body": ["<p>First <a href=\"/x\">link</a></p>", "Second paragraph"],
                "image": {"url": "/lead.jpg", "width": "640px"}
            }
        });
        let map = FieldMap {
            title: Some("/page/headline".into()),
            description: Some("/page/standfirst".into()),
            published: Some("/page/dates/published".into()),
            modified: Some("/page/dates/updated".into()),
            authors: Some("/page/authors".into()),
            tags: Some("/page/tags".into()),
            body: Some("/page/body".into()),
            images: Some("/page/image".into()),
            genre: Some("/page/missing".into()),
            ..FieldMap::default()
        };
        let mut article = Article::default();
        assert!(apply(&mut article, &state, &map, &base()));

        assert_eq!(article.info.title.as_deref(), Some("State headline"));
        assert_eq!(article.info.description.as_deref(), Some("Summary"));
        assert_eq!(article.info.genre, None);
        assert_eq!(article.time.published, Some(1_539_870_072));
        assert_eq!(article.time.modified, Some(1_539_874_800));
        assert_eq!(article.authors.len(), 2);
        assert_eq!(article.authors[1].url.as_deref(), Some("https://www.example.com/john"));
        assert_eq!(article.tags.len(), 2);
        assert_eq!(
            article.text.markdown,
            "First [link](https://www.example.com/x)\n\nSecond paragraph"
        );
        let thumbnail = article.images.thumbnail.as_ref().unwrap();
        assert_eq!(thumbnail.url, "https://www.example.com/lead.jpg");
        assert_eq!(thumbnail.width, Some(640));
    }

    #[test]
    fn test_byline_string_authors() {
        let state = json!({"author": "By Jane Doe and John Roe, CNN"});
        let map = FieldMap {
            authors: Some("/author".into()),
            ..FieldMap::default()
        };
        let mut article = Article::default();
        assert!(apply(&mut article, &state, &map, &base()));
        let names: Vec<_> = article.authors.iter().filter_map(|a| a.name.as_deref()).collect();
        assert_eq!(names, vec!["Jane Doe", "John Roe, CNN"]);
    }

    #[test]
    fn test_nothing_found() {
        let map = FieldMap {
            title: Some("/nope".into()),
            ..FieldMap::default()
        };
        let mut article = Article::default();
        assert!(!apply(&mut article, &json!({"a": 1}), &map, &base()));
    }
}
