use readability::extractor;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::article::clean_text;

static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static H1_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static BODY_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

static HEURISTIC_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "article",
        "main",
        "[role='main']",
        ".content",
        ".post",
        ".article",
        "#content",
        "#main",
        ".entry-content",
    ]
    .iter()
    .map(|s| Selector::parse(s).unwrap())
    .collect()
});

const MIN_HEURISTIC_TEXT: usize = 100;

fn visible_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// HTML of the article body.
///
/// Site candidates are tried in priority order; the first with visible text
/// wins. Without a match, readability scores the (already pruned) document,
/// then a list of common container selectors, then `<body>`.
pub fn main_content_html(document: &Html, candidates: &[Selector], url: &Url) -> Option<String> {
    for selector in candidates {
        if let Some(element) = document
            .select(selector)
            .find(|element| !visible_text(*element).trim().is_empty())
        {
            return Some(element.html());
        }
    }

    let serialized = document.html();
    match extractor::extract(&mut serialized.as_bytes(), url) {
        Ok(product) if !product.text.trim().is_empty() => return Some(product.content),
        Ok(_) => debug!(url = %url, "readability found no content"),
        Err(err) => debug!(url = %url, error = ?err, "readability failed"),
    }

    for selector in HEURISTIC_SELECTORS.iter() {
        if let Some(element) = document
            .select(selector)
            .find(|element| visible_text(*element).trim().len() > MIN_HEURISTIC_TEXT)
        {
            return Some(element.html());
        }
    }

    document
        .select(&BODY_SELECTOR)
        .next()
        .filter(|body| !visible_text(*body).trim().is_empty())
        .map(|body| body.html())
}

/// `<title>`, falling back to the first `<h1>`.
pub fn document_title(document: &Html) -> Option<String> {
    document
        .select(&TITLE_SELECTOR)
        .chain(document.select(&H1_SELECTOR))
        .find_map(|element| clean_text(&visible_text(element)))
}

/// Text of the elements matched by the first selector that yields any.
pub fn first_texts(document: &Html, selectors: &[Selector]) -> Vec<String> {
    selectors
        .iter()
        .map(|selector| {
            document
                .select(selector)
                .filter_map(|element| clean_text(&visible_text(element)))
                .collect::<Vec<_>>()
        })
        .find(|texts| !texts.is_empty())
        .unwrap_or_default()
}
