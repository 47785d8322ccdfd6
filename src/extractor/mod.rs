pub mod admission;
pub mod cleaner;
pub mod jsonld;
pub mod language;
pub mod meta;
pub mod reader;
pub mod state;
pub mod text;

#[cfg(test)]
mod tests;

use scraper::Html;
use tracing::debug;

use crate::article::{Article, ArticleError, Author, authors::split_byline, merge::apply_meta};
use crate::fetcher::Page;
use crate::sites::Site;

pub use admission::{AdmissionPolicy, Rejection};
pub use meta::MetaTags;

/// Normalize one page of `site` into a validated article.
///
/// Sources run in precedence order, later ones overwriting earlier ones:
/// meta tags, JSON-LD, embedded state. The DOM then supplies the body
/// (unless the state already did), inline images and bylines.
pub fn normalize(page: &Page, site: &Site) -> Result<Article, ArticleError> {
    let mut document = page.document();
    let mut article = Article::default();

    // 1. Meta tags, with <title> as the last title candidate
    let meta = MetaTags::from_document(&document);
    apply_meta(&mut article, &meta);
    if article.info.title.is_none()
        && let Some(title) = reader::document_title(&document)
    {
        article.set_title(&title);
    }

    // 2. JSON-LD
    let blocks = jsonld::apply_json_ld(&mut article, &document, &page.url);

    // 3. Embedded state
    let from_state = site.state().is_some_and(|profile| {
        state::apply_state(&mut article, &document, profile, site.limits(), &page.url)
    });

    // 4. Bylines, before the removal list can take them out
    for byline in reader::first_texts(&document, site.author_selectors()) {
        for name in split_byline(&byline) {
            if let Some(author) = Author::named(&name) {
                article.add_author(author);
            }
        }
    }

    // 5. Body
    let pruned = cleaner::prune(&mut document, site.remove_selectors());
    if !article.has_body() {
        if let Some(html) = reader::main_content_html(&document, site.body_selectors(), &page.url) {
            let sanitized = cleaner::sanitize_fragment(&html, &page.url);
            let fragment = Html::parse_fragment(&sanitized);
            let body = text::extract_body(fragment.root_element(), site.denylist(), &page.url);
            article.set_markdown(body.markdown());
            for image in body.images {
                article.add_image(image);
            }
        } else {
            debug!(url = %page.url, "no main content");
        }
    }

    if article.publisher.organisation.is_none()
        && let Some(organisation) = site.organisation()
    {
        article.set_organisation(organisation);
    }

    debug!(
        url = %page.url,
        meta_tags = meta.len(),
        json_ld_blocks = blocks,
        from_state,
        pruned,
        "normalized page"
    );

    let mut article = article.finalize(&page.url)?;
    article.authors.retain(|author| !site.is_denied_author(author));
    Ok(article)
}
