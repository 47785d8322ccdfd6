//! Link identity and frontier classification.
//!
//! A [`LinkClassifier`] turns a URL into the stable per-site id of the
//! article it addresses, or `None` when the URL does not look like an
//! article on that site. The same canonical form serves as the frontier
//! dedup key, and the id becomes part of the storage key.

use percent_encoding::percent_decode_str;
use regex::{Regex, RegexSet};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Accepted path segment counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathShape {
    Exact(Vec<usize>),
    AtLeast(usize),
}

impl Default for PathShape {
    fn default() -> Self {
        Self::AtLeast(1)
    }
}

impl PathShape {
    fn accepts(&self, count: usize) -> bool {
        match self {
            Self::Exact(counts) => counts.contains(&count),
            Self::AtLeast(min) => count >= *min,
        }
    }
}

/// Which path segment carries the id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentPick {
    #[default]
    Last,
    /// `0` is the last segment, `1` the one before it.
    FromEnd(usize),
}

/// Declarative id derivation for one site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRule {
    #[serde(default)]
    pub shape: PathShape,
    #[serde(default)]
    pub segment: SegmentPick,
    /// Regex the picked segment must match.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Replace the segment by its md5 hex digest.
    #[serde(default)]
    pub hash: bool,
    /// Trailing segments such as `index.html` that are ignored.
    #[serde(default)]
    pub drop_trailing: Vec<String>,
    /// Query parameters that survive canonicalisation.
    #[serde(default)]
    pub keep_query: Vec<String>,
    /// Build the id from these query parameters instead of the path.
    #[serde(default)]
    pub query_id: Vec<String>,
}

/// Frontier admission patterns, matched against the full URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierRule {
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub follow: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LinkClassifier {
    domain: String,
    rule: LinkRule,
    pattern: Option<Regex>,
}

impl LinkClassifier {
    pub fn new(domain: &str, rule: LinkRule) -> Result<Self, regex::Error> {
        let pattern = rule.pattern.as_deref().map(Regex::new).transpose()?;
        Ok(Self {
            domain: domain.trim().trim_start_matches("www.").to_ascii_lowercase(),
            rule,
            pattern,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Whether `url` is served from this site (subdomains included).
    pub fn owns(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
            && url.host_str().is_some_and(|host| host_matches(host, &self.domain))
    }

    /// Fragment-free URL with only allowlisted query parameters and no
    /// trailing slash. `None` for URLs outside the site.
    pub fn canonical_url(&self, url: &Url) -> Option<Url> {
        if !self.owns(url) {
            return None;
        }
        Some(canonicalize(url, &self.rule.keep_query))
    }

    /// Stable article id, or `None` when the URL is not an article.
    pub fn link_id(&self, url: &Url) -> Option<String> {
        let canonical = self.canonical_url(url)?;

        let mut segments: Vec<&str> = canonical
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        if segments
            .last()
            .is_some_and(|last| self.rule.drop_trailing.iter().any(|d| d == last))
        {
            segments.pop();
        }
        if !self.rule.shape.accepts(segments.len()) {
            return None;
        }

        if !self.rule.query_id.is_empty() {
            return self.query_id(url);
        }

        let raw = match self.rule.segment {
            SegmentPick::Last => segments.last()?,
            SegmentPick::FromEnd(back) => segments.len().checked_sub(back + 1).map(|i| segments[i])?,
        };
        let segment = percent_decode_str(raw).decode_utf8_lossy();
        if segment.is_empty() {
            return None;
        }
        if let Some(pattern) = &self.pattern
            && !pattern.is_match(&segment)
        {
            return None;
        }

        if self.rule.hash {
            Some(format!("{:x}", md5::compute(segment.as_bytes())))
        } else {
            Some(segment.into_owned())
        }
    }

    fn query_id(&self, url: &Url) -> Option<String> {
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let parts = self
            .rule
            .query_id
            .iter()
            .map(|name| {
                pairs
                    .iter()
                    .find(|(key, value)| key == name && !value.is_empty())
                    .map(|(_, value)| value.as_str())
            })
            .collect::<Option<Vec<_>>>()?;
        let id = parts.join("-");
        if let Some(pattern) = &self.pattern
            && !pattern.is_match(&id)
        {
            return None;
        }
        Some(id)
    }
}

/// `host` equals `domain` or is a subdomain of it.
pub fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Drop the fragment and every query parameter not in `keep_query`, and trim
/// a trailing slash from non-root paths.
pub fn canonicalize(url: &Url, keep_query: &[String]) -> Url {
    let mut canonical = url.clone();
    canonical.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .filter(|(key, _)| keep_query.iter().any(|k| k == key))
        .collect();
    if kept.is_empty() {
        canonical.set_query(None);
    } else {
        canonical.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = canonical.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        canonical.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
    }
    canonical
}

#[derive(Debug, Clone)]
pub struct Frontier {
    deny: RegexSet,
    follow: RegexSet,
}

impl Frontier {
    pub fn new(rule: &FrontierRule) -> Result<Self, regex::Error> {
        Ok(Self {
            deny: RegexSet::new(&rule.deny)?,
            follow: RegexSet::new(&rule.follow)?,
        })
    }

    /// Frontier admission independent of classification.
    pub fn url_filter(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https") && !self.deny.is_match(url.as_str())
    }

    /// Non-article pages (sections, indexes) worth crawling for links.
    pub fn follows(&self, url: &Url) -> bool {
        self.follow.is_match(url.as_str())
    }
}

/// Every distinct absolute http(s) link in the document, fragments removed.
pub fn discover(document: &Html, base: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with('#'))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|mut url| {
            url.set_fragment(None);
            url
        })
        .filter(|url| seen.insert(url.to_string()))
        .collect()
}
