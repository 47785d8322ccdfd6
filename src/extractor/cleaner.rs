use ammonia::{Builder, UrlRelative};
use scraper::{Html, Selector};
use std::sync::LazyLock;
use url::Url;

/// Elements that never carry article text, removed on every site.
static ALWAYS_REMOVED: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["script", "style", "noscript", "template", "iframe", "form", "nav", "svg"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

/// Detach every element matching one of `selectors` (plus the global
/// noise list) from the document.
pub fn prune(document: &mut Html, selectors: &[Selector]) -> usize {
    let ids: Vec<_> = ALWAYS_REMOVED
        .iter()
        .chain(selectors)
        .flat_map(|selector| document.select(selector).map(|element| element.id()).collect::<Vec<_>>())
        .collect();

    let mut removed = 0;
    for id in ids {
        if let Some(mut node) = document.tree.get_mut(id)
            && node.parent().is_some()
        {
            node.detach();
            removed += 1;
        }
    }
    removed
}

/// Sanitize a main-content fragment and make every link absolute.
pub fn sanitize_fragment(html: &str, base: &Url) -> String {
    Builder::default()
        .url_relative(UrlRelative::RewriteWithBase(base.clone()))
        .link_rel(None)
        .add_tag_attributes("img", &["data-src", "data-original"])
        .clean(html)
        .to_string()
}
