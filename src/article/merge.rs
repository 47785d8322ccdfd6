//! Candidate-key lists and the metadata stage of the merge.
//!
//! Each field walks its list in order and the first present key wins.
//! JSON-LD and embedded state run after this stage and may overwrite.

use crate::article::{
    Article, Author,
    authors::split_byline,
    clean_text,
    media::{RichMedia, parse_dimension_str},
    time::parse_timestamp,
};
use crate::extractor::meta::MetaTags;

pub const TITLE_KEYS: &[&str] = &["og:title", "dc.title", "sailthru.title", "twitter:title", "title"];
pub const DESCRIPTION_KEYS: &[&str] = &[
    "og:description",
    "description",
    "sailthru.description",
    "twitter:description",
    "dc.description",
];
pub const PUBLISHED_KEYS: &[&str] = &[
    "article:published_time",
    "og:article:published_time",
    "datepublished",
    "sailthru.date",
    "dc.date",
    "pubdate",
];
pub const MODIFIED_KEYS: &[&str] = &[
    "article:modified_time",
    "og:updated_time",
    "datemodified",
    "last-modified",
];
pub const GENRE_KEYS: &[&str] = &["article:section", "og:type"];
pub const URL_KEYS: &[&str] = &["og:url", "twitter:url"];
pub const ORGANISATION_KEYS: &[&str] = &["og:site_name", "application-name", "dc.publisher"];
pub const TAG_KEYS: &[&str] = &["article:tag", "news_keywords", "keywords", "sailthru.tags"];
pub const THUMBNAIL_FALLBACK_KEYS: &[&str] = &["twitter:image", "twitter:image:src"];
pub const VIDEO_KEYS: &[&str] = &["og:video:secure_url", "og:video:url", "og:video"];
pub const AUDIO_KEYS: &[&str] = &["og:audio:secure_url", "og:audio"];
pub const AUTHOR_KEYS: &[&str] = &[
    "author",
    "article:author",
    "sailthru.author",
    "byl",
    "parsely-author",
    "dc.creator",
];

fn is_url(value: &str) -> bool {
    let lower = value.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn twitter_profile(handle: &str) -> Option<String> {
    let handle = handle.trim().trim_start_matches('@');
    if handle.is_empty() || handle.contains(char::is_whitespace) {
        return None;
    }
    if is_url(handle) {
        return Some(handle.to_string());
    }
    Some(format!("https://twitter.com/{handle}"))
}

/// Apply metadata-derived fields.
pub fn apply_meta(article: &mut Article, meta: &MetaTags) {
    if let Some(title) = meta.first_present(TITLE_KEYS) {
        article.set_title(title);
    }
    if let Some(description) = meta.first_present(DESCRIPTION_KEYS) {
        article.set_description(description);
    }
    if let Some(genre) = meta.first_present(GENRE_KEYS) {
        article.set_genre(genre);
    }
    if let Some(url) = meta.first_present(URL_KEYS).filter(|url| is_url(url)) {
        article.set_url(url);
    }
    if let Some(organisation) = meta.first_present(ORGANISATION_KEYS) {
        article.set_organisation(organisation);
    }

    article.set_published(meta.first_parsed(PUBLISHED_KEYS, parse_timestamp));
    article.set_modified(meta.first_parsed(MODIFIED_KEYS, parse_timestamp));

    for key in TAG_KEYS {
        for value in meta.get_all(key) {
            value.split(',').for_each(|tag| article.add_tag(tag));
        }
    }

    apply_media(article, meta);
    apply_authors(article, meta);
    apply_publisher(article, meta);
}

fn apply_media(article: &mut Article, meta: &MetaTags) {
    let width = meta.get("og:image:width").and_then(parse_dimension_str);
    let height = meta.get("og:image:height").and_then(parse_dimension_str);
    let mut og_images = meta.get_all("og:image").iter().filter_map(RichMedia::new);

    if let Some(thumbnail) = og_images.next() {
        article.set_thumbnail(
            thumbnail
                .with_dimensions(width, height)
                .with_alt(meta.get("og:image:alt"))
                .with_mime_type(meta.get("og:image:type")),
        );
        og_images.for_each(|image| article.add_image(image));
    } else if let Some(thumbnail) = meta
        .first_present(THUMBNAIL_FALLBACK_KEYS)
        .and_then(RichMedia::new)
    {
        article.set_thumbnail(thumbnail.with_alt(meta.get("twitter:image:alt")));
    }

    if let Some(video) = meta.first_present(VIDEO_KEYS).and_then(RichMedia::new) {
        article.add_video(
            video
                .with_mime_type(meta.get("og:video:type"))
                .with_dimensions(
                    meta.get("og:video:width").and_then(parse_dimension_str),
                    meta.get("og:video:height").and_then(parse_dimension_str),
                ),
        );
    }

    if let Some(audio) = meta.first_present(AUDIO_KEYS).and_then(RichMedia::new) {
        article.add_audio(audio.with_mime_type(meta.get("og:audio:type")));
    }
}

fn apply_authors(article: &mut Article, meta: &MetaTags) {
    let names: Vec<String> = AUTHOR_KEYS
        .iter()
        .map(|key| {
            meta.get_all(key)
                .iter()
                .filter(|value| !is_url(value))
                .flat_map(|value| split_byline(value))
                .collect::<Vec<_>>()
        })
        .find(|names| !names.is_empty())
        .unwrap_or_default();

    let mut authors: Vec<Author> = names.iter().filter_map(|name| Author::named(name)).collect();
    if let [author] = authors.as_mut_slice() {
        author.twitter_url = meta.get("twitter:creator").and_then(twitter_profile);
    }
    authors.into_iter().for_each(|author| article.add_author(author));
}

fn apply_publisher(article: &mut Article, meta: &MetaTags) {
    let facebook = &mut article.publisher.facebook;
    if let Some(url) = meta.get("article:publisher").filter(|url| is_url(url)) {
        facebook.url = Some(url.trim().to_string());
    }
    if let Some(pages) = meta.get("fb:pages") {
        facebook.page_ids = pages.split(',').filter_map(clean_text).collect();
    }
    if let Some(app_id) = meta.get("fb:app_id") {
        facebook.app_id = clean_text(app_id);
    }
    if let Some(status) = meta.get("article:content_tier") {
        facebook.status = clean_text(status);
    }

    let twitter = &mut article.publisher.twitter;
    let fields: [(&str, &mut Option<String>); 6] = [
        ("twitter:card", &mut twitter.card),
        ("twitter:image", &mut twitter.image),
        ("twitter:site", &mut twitter.handle),
        ("twitter:title", &mut twitter.title),
        ("twitter:description", &mut twitter.description),
        ("twitter:domain", &mut twitter.domain),
    ];
    for (key, slot) in fields {
        if let Some(value) = meta.get(key).and_then(clean_text) {
            *slot = Some(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged(pairs: &[(&str, &str)]) -> Article {
        let meta = MetaTags::from_pairs(pairs.iter().copied());
        let mut article = Article::default();
        apply_meta(&mut article, &meta);
        article
    }

    #[test]
    fn test_title_candidates_first_present_wins() {
        let article = merged(&[("twitter:title", "Twitter"), ("dc.title", "Dublin Core")]);
        assert_eq!(article.info.title.as_deref(), Some("Dublin Core"));
    }

    #[test]
    fn test_minimal_open_graph_page() {
        let article = merged(&[
            ("og:title", "T"),
            ("og:description", "D"),
            ("article:published_time", "2018-10-18T13:41:12Z"),
        ]);
        assert_eq!(article.info.title.as_deref(), Some("T"));
        assert_eq!(article.info.description.as_deref(), Some("D"));
        assert_eq!(article.time.published, Some(1_539_870_072));
        assert!(article.time.modified.is_none());
        assert!(article.authors.is_empty());
    }

    #[test]
    fn test_unparseable_published_falls_through() {
        let article = merged(&[
            ("article:published_time", "last Tuesday"),
            ("sailthru.date", "2018-10-18T13:41:12+00:00"),
        ]);
        assert_eq!(article.time.published, Some(1_539_870_072));
    }

    #[test]
    fn test_tags_from_every_source_comma_split() {
        let article = merged(&[
            ("article:tag", "Politics"),
            ("article:tag", "Europe"),
            ("keywords", "brexit, politics ,,Politics"),
        ]);
        let tags: Vec<&str> = article.tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["Europe", "Politics", "brexit", "politics"]);
    }

    #[test]
    fn test_open_graph_image_with_dimensions() {
        let article = merged(&[
            ("og:image", "https://cdn.example.com/lead.jpg"),
            ("og:image:width", "1200px"),
            ("og:image:height", "630"),
            ("og:image:alt", "Lead image"),
            ("og:image", "https://cdn.example.com/second.jpg"),
        ]);
        let thumbnail = article.images.thumbnail.unwrap();
        assert_eq!(thumbnail.url, "https://cdn.example.com/lead.jpg");
        assert_eq!(thumbnail.width, Some(1200));
        assert_eq!(thumbnail.height, Some(630));
        assert_eq!(thumbnail.alt.as_deref(), Some("Lead image"));
        assert_eq!(article.images.images.len(), 1);
    }

    #[test]
    fn test_twitter_image_is_thumbnail_fallback() {
        let article = merged(&[("twitter:image:src", "https://cdn.example.com/tw.jpg")]);
        assert_eq!(
            article.images.thumbnail.map(|t| t.url).as_deref(),
            Some("https://cdn.example.com/tw.jpg")
        );
    }

    #[test]
    fn test_authors_skip_url_values_and_attach_twitter() {
        let article = merged(&[
            ("article:author", "https://www.facebook.com/janedoe"),
            ("byl", "By Jane Doe"),
            ("twitter:creator", "@janedoe"),
        ]);
        assert_eq!(article.authors.len(), 1);
        assert_eq!(article.authors[0].name.as_deref(), Some("Jane Doe"));
        assert_eq!(
            article.authors[0].twitter_url.as_deref(),
            Some("https://twitter.com/janedoe")
        );
    }

    #[test]
    fn test_twitter_creator_ignored_for_multiple_authors() {
        let article = merged(&[("author", "Jane Doe and John Roe"), ("twitter:creator", "@desk")]);
        assert_eq!(article.authors.len(), 2);
        assert!(article.authors.iter().all(|a| a.twitter_url.is_none()));
    }

    #[test]
    fn test_publisher_social_fields() {
        let article = merged(&[
            ("og:site_name", "Example News"),
            ("article:publisher", "https://www.facebook.com/examplenews"),
            ("fb:pages", "123, 456"),
            ("fb:app_id", "789"),
            ("article:content_tier", "free"),
            ("twitter:card", "summary_large_image"),
            ("twitter:site", "@examplenews"),
        ]);
        let publisher = article.publisher;
        assert_eq!(publisher.organisation.as_deref(), Some("Example News"));
        assert_eq!(
            publisher.facebook.url.as_deref(),
            Some("https://www.facebook.com/examplenews")
        );
        assert_eq!(publisher.facebook.page_ids, vec!["123", "456"]);
        assert_eq!(publisher.facebook.app_id.as_deref(), Some("789"));
        assert_eq!(publisher.facebook.status.as_deref(), Some("free"));
        assert_eq!(publisher.twitter.card.as_deref(), Some("summary_large_image"));
        assert_eq!(publisher.twitter.handle.as_deref(), Some("@examplenews"));
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let article = merged(&[]);
        assert_eq!(article, Article::default());
    }
}
