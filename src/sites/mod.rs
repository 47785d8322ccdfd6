//! Per-site profiles.
//!
//! A site is data: selectors for the body, removal and byline lists, an
//! optional embedded-state profile, and the link rules that classify its
//! URLs. Profiles are compiled once into a [`Site`] and looked up by host
//! through a [`SiteRegistry`].

use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::article::{Article, ArticleError, Author};
use crate::extractor::{self, state::StateProfile};
use crate::fetcher::Page;
use crate::links::{Frontier, FrontierRule, LinkClassifier, LinkRule, host_matches};
use crate::script::Limits;

const BUILTIN_SITES: &str = include_str!("builtin.json");

#[derive(Debug, Error)]
pub enum SiteConfigError {
    #[error("invalid site table: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{site}: invalid selector {selector:?}: {reason}")]
    Selector {
        site: String,
        selector: String,
        reason: String,
    },

    #[error("{site}: invalid pattern: {source}")]
    Regex {
        site: String,
        #[source]
        source: regex::Error,
    },

    #[error("{site}: invalid start url {url:?}")]
    StartUrl { site: String, url: String },

    #[error("duplicate site {0}")]
    Duplicate(String),
}

/// Declarative description of one publisher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub domain: String,
    /// Fallback when the page names no publisher.
    #[serde(default)]
    pub organisation: Option<String>,
    #[serde(default)]
    pub start_urls: Vec<String>,
    /// Main content candidates in priority order.
    #[serde(default)]
    pub body: Vec<String>,
    /// Elements pruned before body extraction.
    #[serde(default)]
    pub remove: Vec<String>,
    /// Text fragments dropped from the body.
    #[serde(default)]
    pub denylist: Vec<String>,
    /// Byline elements, read before pruning.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Names never credited as authors, compared case-insensitively.
    #[serde(default)]
    pub author_denylist: Vec<String>,
    #[serde(default)]
    pub state: Option<StateProfile>,
    #[serde(default)]
    pub link: LinkRule,
    #[serde(default)]
    pub frontier: FrontierRule,
}

/// Result of parsing an article page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    pub article: Article,
    pub link_id: String,
}

#[derive(Debug, Clone)]
pub struct Site {
    profile: SiteProfile,
    body: Vec<Selector>,
    remove: Vec<Selector>,
    authors: Vec<Selector>,
    start_urls: Vec<Url>,
    classifier: LinkClassifier,
    frontier: Frontier,
    limits: Limits,
}

fn compile_selectors(site: &str, selectors: &[String]) -> Result<Vec<Selector>, SiteConfigError> {
    selectors
        .iter()
        .map(|selector| {
            Selector::parse(selector).map_err(|err| SiteConfigError::Selector {
                site: site.to_string(),
                selector: selector.clone(),
                reason: format!("{err:?}"),
            })
        })
        .collect()
}

impl Site {
    pub fn compile(profile: SiteProfile) -> Result<Self, SiteConfigError> {
        let site = profile.domain.as_str();
        let regex_error = |source| SiteConfigError::Regex {
            site: site.to_string(),
            source,
        };

        let start_urls = profile
            .start_urls
            .iter()
            .map(|raw| {
                Url::parse(raw)
                    .ok()
                    .filter(|url| matches!(url.scheme(), "http" | "https"))
                    .ok_or_else(|| SiteConfigError::StartUrl {
                        site: site.to_string(),
                        url: raw.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            body: compile_selectors(site, &profile.body)?,
            remove: compile_selectors(site, &profile.remove)?,
            authors: compile_selectors(site, &profile.authors)?,
            classifier: LinkClassifier::new(site, profile.link.clone()).map_err(regex_error)?,
            frontier: Frontier::new(&profile.frontier).map_err(regex_error)?,
            start_urls,
            limits: Limits::default(),
            profile,
        })
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Normalized domain, without `www.`.
    pub fn domain(&self) -> &str {
        self.classifier.domain()
    }

    pub fn organisation(&self) -> Option<&str> {
        self.profile.organisation.as_deref()
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    pub fn start_urls(&self) -> &[Url] {
        &self.start_urls
    }

    pub fn body_selectors(&self) -> &[Selector] {
        &self.body
    }

    pub fn remove_selectors(&self) -> &[Selector] {
        &self.remove
    }

    pub fn author_selectors(&self) -> &[Selector] {
        &self.authors
    }

    pub fn denylist(&self) -> &[String] {
        &self.profile.denylist
    }

    pub fn is_denied_author(&self, author: &Author) -> bool {
        author.name.as_deref().is_some_and(|name| {
            self.profile
                .author_denylist
                .iter()
                .any(|denied| denied.trim().eq_ignore_ascii_case(name))
        })
    }

    pub fn state(&self) -> Option<&StateProfile> {
        self.profile.state.as_ref()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Article id for `url`, `None` when it is not an article of this site.
    pub fn url_parse(&self, url: &Url) -> Option<String> {
        self.classifier.link_id(url)
    }

    pub fn canonical_url(&self, url: &Url) -> Option<Url> {
        self.classifier.canonical_url(url)
    }

    pub fn url_filter(&self, url: &Url) -> bool {
        self.classifier.owns(url) && self.frontier.url_filter(url)
    }

    /// Whether a discovered link goes on the frontier.
    pub fn should_queue(&self, url: &Url) -> bool {
        self.url_filter(url) && (self.url_parse(url).is_some() || self.frontier.follows(url))
    }

    /// Normalize `page` when its URL classifies as an article.
    pub fn parse(&self, page: &Page) -> Result<Option<Parsed>, ArticleError> {
        let Some(link_id) = self.url_parse(&page.url) else {
            return Ok(None);
        };
        let article = extractor::normalize(page, self)?;
        Ok(Some(Parsed { article, link_id }))
    }
}

/// Compiled sites, looked up by host.
#[derive(Debug, Clone, Default)]
pub struct SiteRegistry {
    sites: Vec<Site>,
}

impl SiteRegistry {
    pub fn builtin() -> Result<Self, SiteConfigError> {
        Self::from_json(BUILTIN_SITES)
    }

    pub fn from_json(json: &str) -> Result<Self, SiteConfigError> {
        let profiles: Vec<SiteProfile> = serde_json::from_str(json)?;
        Self::from_profiles(profiles)
    }

    pub fn from_path(path: &Path) -> Result<Self, SiteConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| SiteConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn from_profiles(profiles: Vec<SiteProfile>) -> Result<Self, SiteConfigError> {
        let mut seen = HashSet::new();
        let mut sites = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let site = Site::compile(profile)?;
            if !seen.insert(site.domain().to_string()) {
                return Err(SiteConfigError::Duplicate(site.domain().to_string()));
            }
            sites.push(site);
        }
        Ok(Self { sites })
    }

    pub fn with_limits(self, limits: Limits) -> Self {
        Self {
            sites: self
                .sites
                .into_iter()
                .map(|site| site.with_limits(limits))
                .collect(),
        }
    }

    /// The site owning `url`; the longest matching domain wins.
    pub fn for_url(&self, url: &Url) -> Option<&Site> {
        let host = url.host_str()?;
        self.sites
            .iter()
            .filter(|site| host_matches(host, site.domain()))
            .max_by_key(|site| site.domain().len())
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_builtin_table_compiles() {
        let registry = SiteRegistry::builtin().unwrap();
        assert_eq!(registry.len(), 5);
        for site in registry.sites() {
            assert!(!site.start_urls().is_empty(), "{} has no start urls", site.domain());
            assert!(site.organisation().is_some());
        }
    }

    #[test]
    fn test_builtin_link_ids() {
        let registry = SiteRegistry::builtin().unwrap();
        let cases = [
            (
                "https://www.nytimes.com/2018/10/18/business/fed-rates.html?action=click",
                Some("fed-rates.html".to_string()),
            ),
            ("https://www.nytimes.com/section/business", None),
            (
                "https://www.nzherald.co.nz/business/news/article.cfm?c_id=3&objectid=12145563&ref=rss",
                Some("3-12145563".to_string()),
            ),
            (
                "https://www.reuters.com/article/us-usa-fed/fed-raises-rates-idUSKCN1MS1ZW",
                Some("fed-raises-rates-idUSKCN1MS1ZW".to_string()),
            ),
            (
                "https://www.radionz.co.nz/news/programmes/morningreport/audio/2018665829/bank-rates",
                Some("2018665829".to_string()),
            ),
        ];
        for (link, expected) in cases {
            let link = url(link);
            let site = registry.for_url(&link).unwrap();
            assert_eq!(site.url_parse(&link), expected, "{link}");
        }

        let cnn = url("https://edition.cnn.com/2018/10/18/politics/story-slug/index.html");
        let id = registry.for_url(&cnn).unwrap().url_parse(&cnn).unwrap();
        assert_eq!(id, format!("{:x}", md5::compute("story-slug")));
    }

    #[test]
    fn test_longest_domain_wins() {
        let registry = SiteRegistry::from_profiles(vec![
            SiteProfile {
                domain: "example.com".into(),
                ..SiteProfile::default()
            },
            SiteProfile {
                domain: "news.example.com".into(),
                ..SiteProfile::default()
            },
        ])
        .unwrap();
        let site = registry.for_url(&url("https://www.news.example.com/a")).unwrap();
        assert_eq!(site.domain(), "news.example.com");
        let site = registry.for_url(&url("https://sport.example.com/a")).unwrap();
        assert_eq!(site.domain(), "example.com");
        assert!(registry.for_url(&url("https://other.org/a")).is_none());
    }

    #[test]
    fn test_should_queue() {
        let site = Site::compile(SiteProfile {
            domain: "example.com".into(),
            link: LinkRule {
                shape: crate::links::PathShape::Exact(vec![2]),
                ..LinkRule::default()
            },
            frontier: FrontierRule {
                deny: vec!["/video/".into()],
                follow: vec!["^https://example\\.com/section/".into()],
            },
            ..SiteProfile::default()
        })
        .unwrap();
        assert!(site.should_queue(&url("https://example.com/news/story")));
        assert!(site.should_queue(&url("https://example.com/section/world/europe")));
        assert!(!site.should_queue(&url("https://example.com/video/clip")));
        assert!(!site.should_queue(&url("https://example.com/about")));
        assert!(!site.should_queue(&url("https://elsewhere.com/news/story")));
    }

    #[test]
    fn test_invalid_profiles() {
        let bad_selector = SiteRegistry::from_json(r#"[{"domain": "a.com", "body": ["div[["]}]"#);
        assert!(matches!(bad_selector, Err(SiteConfigError::Selector { .. })));

        let bad_regex = SiteRegistry::from_json(r#"[{"domain": "a.com", "link": {"pattern": "("}}]"#);
        assert!(matches!(bad_regex, Err(SiteConfigError::Regex { .. })));

        let bad_start = SiteRegistry::from_json(r#"[{"domain": "a.com", "start_urls": ["ftp://a.com"]}]"#);
        assert!(matches!(bad_start, Err(SiteConfigError::StartUrl { .. })));

        let duplicate = SiteRegistry::from_json(r#"[{"domain": "a.com"}, {"domain": "www.a.com"}]"#);
        assert!(matches!(duplicate, Err(SiteConfigError::Duplicate(ref d)) if d == "a.com"));

        assert!(matches!(SiteRegistry::from_json("{"), Err(SiteConfigError::Json(_))));
    }
}
