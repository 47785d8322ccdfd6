use scraper::{Html, Selector};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static META_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta").unwrap());

/// Attribute precedence for the key of one `<meta>` element.
const KEY_ATTRIBUTES: [&str; 3] = ["name", "itemprop", "property"];

/// Flat view over a page's `<meta>` tags.
///
/// Keys are lower-cased. Every value is kept in document order because a
/// few keys (`article:tag`, `og:image`) legitimately repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaTags {
    entries: BTreeMap<String, Vec<String>>,
}

impl MetaTags {
    pub fn from_document(document: &Html) -> Self {
        let pairs = document.select(&META_SELECTOR).filter_map(|element| {
            let element = element.value();
            let key = KEY_ATTRIBUTES
                .iter()
                .filter_map(|attr| element.attr(attr))
                .map(str::trim)
                .find(|key| !key.is_empty())?;
            let content = element.attr("content")?;
            Some((key, content))
        });
        Self::from_pairs(pairs)
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut entries: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in pairs {
            let key = key.trim().to_lowercase();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                continue;
            }
            entries.entry(key).or_default().push(value.to_string());
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// First value of the first key in `keys` that is present.
    pub fn first_present(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// Like [`first_present`](Self::first_present), but keeps looking until
    /// a value survives `parse`.
    pub fn first_parsed<T>(&self, keys: &[&str], parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        keys.iter()
            .flat_map(|key| self.get_all(key))
            .find_map(|value| parse(value))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
