//! Canonical article record shared by every site.
//!
//! Extraction strategies mutate an [`Article`] in place through the setters
//! below; [`Article::finalize`] then validates required fields and derives
//! everything that depends on the full record (plaintext, author cleanup,
//! media dedup). Serialization omits every empty value.

pub mod authors;
pub mod media;
pub mod merge;
pub mod plaintext;
pub mod time;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;
use url::Url;

pub use media::{MediaProbe, RichMedia};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArticleError {
    #[error("no title found for {url}")]
    MissingTitle { url: String },

    #[error("no organisation found for {url}")]
    MissingOrganisation { url: String },

    #[error("no publication time found for {url}")]
    MissingPublished { url: String },

    #[error("empty article body for {url}")]
    EmptyBody { url: String },
}

impl ArticleError {
    pub fn url(&self) -> &str {
        match self {
            ArticleError::MissingTitle { url }
            | ArticleError::MissingOrganisation { url }
            | ArticleError::MissingPublished { url }
            | ArticleError::EmptyBody { url } => url,
        }
    }
}

pub(crate) fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

/// Trim and collapse internal whitespace; `None` when nothing is left.
pub(crate) fn clean_text(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<i64>,
}

impl ArticleTime {
    pub fn is_empty(&self) -> bool {
        self.published.is_none() && self.modified.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    #[serde(default, skip_serializing_if = "is_blank")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub description: Option<String>,
}

impl Info {
    pub fn is_empty(&self) -> bool {
        is_blank(&self.genre) && is_blank(&self.url) && is_blank(&self.title) && is_blank(&self.description)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Images {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<RichMedia>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<RichMedia>,
}

impl Images {
    pub fn is_empty(&self) -> bool {
        self.thumbnail.is_none() && self.images.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, skip_serializing_if = "is_blank")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub twitter_url: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<RichMedia>,
}

impl Author {
    pub fn named(name: &str) -> Option<Self> {
        clean_text(name).map(|name| Self {
            name: Some(name),
            ..Self::default()
        })
    }

    /// An author needs at least a name or a profile url to be kept.
    pub fn is_identifiable(&self) -> bool {
        !is_blank(&self.name) || !is_blank(&self.url)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facebook {
    #[serde(default, skip_serializing_if = "is_blank")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub page_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub status: Option<String>,
}

impl Facebook {
    pub fn is_empty(&self) -> bool {
        is_blank(&self.url) && self.page_ids.is_empty() && is_blank(&self.app_id) && is_blank(&self.status)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Twitter {
    #[serde(default, skip_serializing_if = "is_blank")]
    pub card: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub domain: Option<String>,
}

impl Twitter {
    pub fn is_empty(&self) -> bool {
        [
            &self.card,
            &self.image,
            &self.handle,
            &self.title,
            &self.description,
            &self.domain,
        ]
        .into_iter()
        .all(is_blank)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publisher {
    #[serde(default, skip_serializing_if = "is_blank")]
    pub organisation: Option<String>,
    #[serde(default, skip_serializing_if = "Facebook::is_empty")]
    pub facebook: Facebook,
    #[serde(default, skip_serializing_if = "Twitter::is_empty")]
    pub twitter: Twitter,
}

impl Publisher {
    pub fn is_empty(&self) -> bool {
        is_blank(&self.organisation) && self.facebook.is_empty() && self.twitter.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub markdown: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plaintext: String,
}

impl Text {
    pub fn is_empty(&self) -> bool {
        self.markdown.is_empty() && self.plaintext.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "ArticleTime::is_empty")]
    pub time: ArticleTime,
    #[serde(default, skip_serializing_if = "Info::is_empty")]
    pub info: Info,
    #[serde(default, skip_serializing_if = "Images::is_empty")]
    pub images: Images,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub videos: Vec<RichMedia>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio: Vec<RichMedia>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Author>,
    #[serde(default, skip_serializing_if = "Publisher::is_empty")]
    pub publisher: Publisher,
    #[serde(default, skip_serializing_if = "Text::is_empty")]
    pub text: Text,
}

fn overwrite(slot: &mut Option<String>, value: &str) {
    if let Some(value) = clean_text(value) {
        *slot = Some(value);
    }
}

impl Article {
    pub fn set_title(&mut self, value: &str) {
        overwrite(&mut self.info.title, value);
    }

    pub fn set_description(&mut self, value: &str) {
        overwrite(&mut self.info.description, value);
    }

    pub fn set_genre(&mut self, value: &str) {
        overwrite(&mut self.info.genre, value);
    }

    pub fn set_url(&mut self, value: &str) {
        overwrite(&mut self.info.url, value);
    }

    pub fn set_organisation(&mut self, value: &str) {
        overwrite(&mut self.publisher.organisation, value);
    }

    pub fn set_published(&mut self, value: Option<i64>) {
        if value.is_some() {
            self.time.published = value;
        }
    }

    pub fn set_modified(&mut self, value: Option<i64>) {
        if value.is_some() {
            self.time.modified = value;
        }
    }

    pub fn add_tag(&mut self, value: &str) {
        if let Some(tag) = clean_text(value) {
            self.tags.insert(tag);
        }
    }

    pub fn set_thumbnail(&mut self, media: RichMedia) {
        self.images.thumbnail = Some(media);
    }

    pub fn add_image(&mut self, media: RichMedia) {
        self.images.images.push(media);
    }

    pub fn add_video(&mut self, media: RichMedia) {
        self.videos.push(media);
    }

    pub fn add_audio(&mut self, media: RichMedia) {
        self.audio.push(media);
    }

    pub fn add_author(&mut self, author: Author) {
        if author.is_identifiable() {
            self.authors.push(author);
        }
    }

    /// Replace the author list when a richer source found at least one author.
    pub fn replace_authors(&mut self, authors: Vec<Author>) {
        let authors: Vec<Author> = authors.into_iter().filter(Author::is_identifiable).collect();
        if !authors.is_empty() {
            self.authors = authors;
        }
    }

    pub fn set_markdown(&mut self, markdown: String) {
        let markdown = markdown.trim();
        if !markdown.is_empty() {
            self.text.markdown = markdown.to_string();
        }
    }

    pub fn has_body(&self) -> bool {
        !self.text.markdown.trim().is_empty()
    }

    /// Validate required fields and derive the dependent ones.
    pub fn finalize(mut self, page_url: &Url) -> Result<Article, ArticleError> {
        let url = page_url.to_string();
        if is_blank(&self.info.url) {
            self.info.url = Some(url.clone());
        }
        if is_blank(&self.info.title) {
            return Err(ArticleError::MissingTitle { url });
        }
        if is_blank(&self.publisher.organisation) {
            return Err(ArticleError::MissingOrganisation { url });
        }
        let Some(published) = self.time.published else {
            return Err(ArticleError::MissingPublished { url });
        };
        self.time.modified = self.time.modified.or(Some(published));

        self.text.plaintext = plaintext::markdown_to_plaintext(&self.text.markdown);
        if self.text.plaintext.is_empty() {
            return Err(ArticleError::EmptyBody { url });
        }

        self.authors = authors::clean_authors(
            std::mem::take(&mut self.authors),
            self.publisher.organisation.as_deref(),
        );

        let thumbnail_url = self.images.thumbnail.as_ref().map(|t| t.url.clone());
        dedup_media(&mut self.images.images);
        if let Some(thumbnail_url) = thumbnail_url {
            self.images.images.retain(|image| image.url != thumbnail_url);
        }
        dedup_media(&mut self.videos);
        dedup_media(&mut self.audio);

        Ok(self)
    }

    /// Every media item owned by the article, author portraits included.
    pub fn media_mut(&mut self) -> impl Iterator<Item = &mut RichMedia> {
        self.images
            .thumbnail
            .iter_mut()
            .chain(self.images.images.iter_mut())
            .chain(self.videos.iter_mut())
            .chain(self.audio.iter_mut())
            .chain(self.authors.iter_mut().filter_map(|a| a.image.as_mut()))
    }

    pub async fn backfill_media(&mut self, probe: &MediaProbe) {
        for media in self.media_mut() {
            probe.backfill(media).await;
        }
    }
}

fn dedup_media(items: &mut Vec<RichMedia>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.url.clone()));
}

/// One admitted article as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub article: Article,
    pub url: String,
}

impl ArticleRecord {
    pub fn new(article: Article, page_url: &Url) -> Self {
        Self {
            article,
            url: page_url.to_string(),
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}


#[cfg(all(test, feature = "fuzz"))]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    fn holds_empty_value(value: &Value) -> bool {
        match value {
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty() || items.iter().any(holds_empty_value),
            Value::Object(map) => map.is_empty() || map.values().any(holds_empty_value),
            Value::Null => true,
            _ => false,
        }
    }

    proptest! {
        #[test]
        fn serialized_articles_never_hold_empty_values(
            title in "\\PC{0,20}",
            tags in proptest::collection::vec("\\PC{0,8}", 0..4),
            body in "\\PC{0,60}",
        ) {
            let mut article = Article::default();
            article.set_title(&title);
            article.set_organisation("Example");
            article.set_published(Some(1));
            for tag in &tags {
                article.add_tag(tag);
            }
            article.set_markdown(body);
            let url = Url::parse("https://example.com/a").unwrap();
            if let Ok(article) = article.finalize(&url) {
                let json = serde_json::to_value(&article).unwrap();
                prop_assert!(!holds_empty_value(&json));
            }
        }

        #[test]
        fn serialization_is_stable_across_round_trips(
            title in "[a-z]{1,10}( [a-z]{1,10})?",
            tags in proptest::collection::vec("[a-z]{1,8}", 0..4),
        ) {
            let mut article = Article::default();
            article.set_title(&title);
            article.set_organisation("Example");
            article.set_published(Some(1));
            for tag in &tags {
                article.add_tag(tag);
            }
            article.set_markdown("Body".to_string());
            let url = Url::parse("https://example.com/a").unwrap();
            let first = serde_json::to_string(&article.finalize(&url).unwrap()).unwrap();
            let reparsed: Article = serde_json::from_str(&first).unwrap();
            prop_assert_eq!(first, serde_json::to_string(&reparsed).unwrap());
        }
    }
}
