use std::fs;
use url::Url;

use crate::article::ArticleError;
use crate::extractor::{AdmissionPolicy, Rejection, normalize};
use crate::fetcher::Page;
use crate::sites::{Site, SiteProfile, SiteRegistry};

fn fixture(name: &str) -> String {
    fs::read_to_string(format!("src/extractor/tests/fixtures/{name}"))
        .expect("Failed to read test fixture")
}

fn create_test_page(html: impl Into<String>, url: &str) -> Page {
    Page::new(Url::parse(url).unwrap(), html)
}

fn example_site() -> Site {
    Site::compile(SiteProfile {
        domain: "news.example.com".into(),
        organisation: Some("Example News".into()),
        body: vec!["article.story".into(), "article".into()],
        remove: vec!["div.share-tools".into()],
        denylist: vec!["Advertisement".into()],
        authors: vec!["span.byline".into()],
        ..SiteProfile::default()
    })
    .unwrap()
}

#[test]
fn test_minimal_meta_article() {
    let html = r#"<html><head>
        <meta property="og:title" content="T">
        <meta property="og:description" content="D">
        <meta property="article:published_time" content="2018-10-18T13:41:12Z">
        </head><body><article><p>Hello world</p></article></body></html>"#;
    let page = create_test_page(html, "https://news.example.com/2018/10/18/story");

    let article = normalize(&page, &example_site()).unwrap();

    assert_eq!(article.info.title.as_deref(), Some("T"));
    assert_eq!(article.info.description.as_deref(), Some("D"));
    assert_eq!(article.time.published, Some(1_539_870_072));
    assert_eq!(article.time.modified, Some(1_539_870_072));
    assert_eq!(article.text.plaintext, "Hello world");
    assert_eq!(
        article.info.url.as_deref(),
        Some("https://news.example.com/2018/10/18/story")
    );
    assert_eq!(article.publisher.organisation.as_deref(), Some("Example News"));
}

#[test]
fn test_extract_article() {
    let page = create_test_page(
        fixture("article.html"),
        "https://news.example.com/2018/10/18/bus-network",
    );
    let article = normalize(&page, &example_site()).unwrap();

    // JSON-LD headline overrides og:title
    assert_eq!(article.info.title.as_deref(), Some("Council expands the bus network"));
    assert_eq!(article.info.description.as_deref(), Some("Three new routes by next year."));
    assert_eq!(article.time.published, Some(1_539_870_072));
    assert_eq!(article.time.modified, Some(1_539_936_000));
    assert_eq!(article.publisher.twitter.handle.as_deref(), Some("@examplenews"));

    for tag in ["Transport", "Local", "buses", "council"] {
        assert!(article.tags.contains(tag), "missing tag {tag}");
    }

    let names: Vec<_> = article.authors.iter().filter_map(|a| a.name.as_deref()).collect();
    assert_eq!(names, vec!["Jane Doe", "John Roe"]);
    assert_eq!(
        article.authors[0].url.as_deref(),
        Some("https://news.example.com/authors/jane")
    );

    let thumbnail = article.images.thumbnail.as_ref().unwrap();
    assert_eq!(thumbnail.url, "https://news.example.com/images/bus.jpg");
    assert_eq!(thumbnail.width, Some(1200));
    assert!(
        article
            .images
            .images
            .iter()
            .any(|image| image.url == "https://news.example.com/images/route-map.png")
    );

    let markdown = &article.text.markdown;
    assert!(markdown.contains("[northern suburbs](https://news.example.com/suburbs)"));
    assert!(markdown.contains("The city council voted on Tuesday"));
    assert!(!markdown.contains("Share this story"));
    assert!(!markdown.contains("Advertisement"));
    assert!(!markdown.contains("trackPageView"));
    assert!(!markdown.contains("Copyright"));

    let plaintext = &article.text.plaintext;
    assert!(plaintext.contains("northern suburbs"));
    assert!(!plaintext.contains("https://"));
    assert!(!plaintext.contains("Route map"));

    assert_eq!(AdmissionPolicy::default().admit(&article), Ok(()));
}

#[test]
fn test_extract_block_tree_state() {
    let registry = SiteRegistry::builtin().unwrap();
    let url = "https://www.nytimes.com/2018/10/18/business/fed-rates.html";
    let page = create_test_page(fixture("nytimes.html"), url);
    let site = registry.for_url(&page.url).unwrap();

    let parsed = site.parse(&page).unwrap().unwrap();
    let article = parsed.article;

    assert_eq!(parsed.link_id, "fed-rates.html");
    assert_eq!(article.info.title.as_deref(), Some("Rates Rise Again"));
    assert_eq!(article.time.published, Some(1_539_870_072));
    assert_eq!(article.time.modified, Some(1_539_874_800));
    assert_eq!(article.publisher.organisation.as_deref(), Some("The New York Times"));
    assert!(article.tags.contains("Interest Rates"));
    assert_eq!(article.authors.len(), 1);
    assert_eq!(article.authors[0].name.as_deref(), Some("Jane Doe"));

    // State body replaces the server-rendered placeholder
    assert_eq!(
        article.text.markdown,
        "The bank [raised rates](https://www.nytimes.com/topic/rates)\n\n\
         ![The bank. Photo: Agency](https://static01.nyt.com/l.jpg)"
    );
    assert_eq!(article.text.plaintext, "The bank raised rates");
    assert_eq!(article.images.images[0].width, Some(1000));
}

#[test]
fn test_extract_script_fields_state() {
    let registry = SiteRegistry::builtin().unwrap();
    let url = "https://edition.cnn.com/2018/10/18/politics/fed-rates/index.html";
    let page = create_test_page(fixture("cnn.html"), url);
    let site = registry.for_url(&page.url).unwrap();
    assert_eq!(site.domain(), "cnn.com");

    let parsed = site.parse(&page).unwrap().unwrap();
    assert_eq!(parsed.link_id, format!("{:x}", md5::compute("fed-rates")));

    let article = parsed.article;
    let names: Vec<_> = article.authors.iter().filter_map(|a| a.name.as_deref()).collect();
    assert_eq!(names, vec!["Jane Doe", "John Roe"]);

    let plaintext = &article.text.plaintext;
    assert!(plaintext.contains("The Federal Reserve raised rates again."));
    assert!(plaintext.contains("Markets shrugged off the move."));
    assert!(!plaintext.contains("Read more"));
    assert!(!plaintext.contains("Show all photos"));
    assert!(!plaintext.contains("CNN Library"));
}

#[test]
fn test_denied_author_names_are_dropped() {
    let registry = SiteRegistry::builtin().unwrap();
    let url = "https://edition.cnn.com/2018/10/18/politics/fed-rates/index.html";
    let site = registry.for_url(&Url::parse(url).unwrap()).unwrap();

    let html = fixture("cnn.html").replace("By Jane Doe and John Roe, CNN", "By CNN Library");
    let article = normalize(&create_test_page(html, url), site).unwrap();
    assert!(
        article
            .authors
            .iter()
            .all(|author| author.name.as_deref() != Some("CNN Library"))
    );

    let html = fixture("cnn.html").replace("John Roe, CNN", "CNN Library, CNN");
    let article = normalize(&create_test_page(html, url), site).unwrap();
    let names: Vec<_> = article.authors.iter().filter_map(|a| a.name.as_deref()).collect();
    assert_eq!(names, vec!["Jane Doe"]);
}

#[test]
fn test_normalize_is_idempotent() {
    let page = create_test_page(
        fixture("article.html"),
        "https://news.example.com/2018/10/18/bus-network",
    );
    let site = example_site();
    let first = serde_json::to_vec(&normalize(&page, &site).unwrap()).unwrap();
    let second = serde_json::to_vec(&normalize(&page, &site).unwrap()).unwrap();
    assert_eq!(first, second);

    let registry = SiteRegistry::builtin().unwrap();
    let page = create_test_page(
        fixture("nytimes.html"),
        "https://www.nytimes.com/2018/10/18/business/fed-rates.html",
    );
    let site = registry.for_url(&page.url).unwrap();
    let first = serde_json::to_vec(&normalize(&page, site).unwrap()).unwrap();
    let second = serde_json::to_vec(&normalize(&page, site).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_non_article_url_is_skipped() {
    let registry = SiteRegistry::builtin().unwrap();
    let page = create_test_page(fixture("nytimes.html"), "https://www.nytimes.com/section/business");
    let site = registry.for_url(&page.url).unwrap();
    assert_eq!(site.parse(&page).unwrap(), None);
}

#[test]
fn test_missing_published_is_fatal() {
    let html = r#"<html><head><meta property="og:title" content="Undated"></head>
        <body><article><p>Some text without a date.</p></article></body></html>"#;
    let page = create_test_page(html, "https://news.example.com/undated");
    assert_eq!(
        normalize(&page, &example_site()),
        Err(ArticleError::MissingPublished {
            url: "https://news.example.com/undated".into()
        })
    );
}

#[test]
fn test_missing_organisation_is_fatal() {
    let site = Site::compile(SiteProfile {
        domain: "example.org".into(),
        ..SiteProfile::default()
    })
    .unwrap();
    let html = r#"<html><head><title>T</title>
        <meta name="dc.date" content="2018-10-18T13:41:12+02:00"></head>
        <body><p>Body</p></body></html>"#;
    let page = create_test_page(html, "https://example.org/a");
    assert!(matches!(
        normalize(&page, &site),
        Err(ArticleError::MissingOrganisation { .. })
    ));
}

#[test]
fn test_reject_cookie_wall() {
    let page = create_test_page(fixture("cookie_wall.html"), "https://news.example.com/wall");
    let site = Site::compile(SiteProfile {
        domain: "news.example.com".into(),
        ..SiteProfile::default()
    })
    .unwrap();

    let article = normalize(&page, &site).unwrap();
    assert_eq!(article.info.title.as_deref(), Some("Before you continue"));
    assert!(matches!(
        AdmissionPolicy::default().admit(&article),
        Err(Rejection::Boilerplate { .. })
    ));
}

#[test]
fn test_malformed_html() {
    let html = r#"<html><head><title>Broken</title>
        <meta property="article:published_time" content="2018-10-18T13:41:12Z">
        <body><article><p>Unclosed tags<div>More content"#;
    let page = create_test_page(html, "https://news.example.com/broken");

    let article = normalize(&page, &example_site()).unwrap();
    assert_eq!(article.info.title.as_deref(), Some("Broken"));
    assert!(article.text.plaintext.contains("Unclosed tags"));
}

#[cfg(feature = "fuzz")]
mod fuzz {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_normalize_never_panics(
            html in ".*",
            path in "/[a-z0-9/]*"
        ) {
            let page = create_test_page(html, &format!("https://news.example.com{path}"));
            let _ = normalize(&page, &example_site());
        }

        #[test]
        fn test_scripts_never_panic(body in ".*") {
            let html = format!("<script>window.__STATE__ = {body}</script>");
            let site = Site::compile(SiteProfile {
                domain: "news.example.com".into(),
                state: serde_json::from_str(
                    r#"{"global": "__STATE__", "schema": {"kind": "block_tree"}}"#,
                ).ok(),
                ..SiteProfile::default()
            })
            .unwrap();
            let _ = normalize(&create_test_page(html, "https://news.example.com/a"), &site);
        }
    }
}
