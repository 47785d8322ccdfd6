//! robots.txt rules and a per-origin cache.
//!
//! Groups are selected by the agent's product token, the longest matching
//! rule decides and `Allow` wins ties. `*` and a trailing `$` are honoured in
//! patterns. A missing or unreachable robots.txt allows everything.

use dashmap::DashMap;
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

const MAX_ROBOTS_BYTES: usize = 512 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsTxt {
    groups: Vec<Group>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Group {
    /// Lowercase agent names, `*` included.
    agents: Vec<String>,
    rules: Vec<Rule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

impl RobotsTxt {
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut reading_agents = false;

        for line in content.lines() {
            let line = line.split_once('#').map_or(line, |(before, _)| before).trim();
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if !reading_agents {
                        groups.push(Group::default());
                        reading_agents = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    reading_agents = false;
                    // An empty Disallow allows everything
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.rules.push(Rule {
                            allow: directive == "allow",
                            pattern: value.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }

        Self { groups }
    }

    /// Whether `agent` may fetch `path` (path plus query).
    pub fn is_allowed(&self, agent: &str, path: &str) -> bool {
        let agent = agent.to_ascii_lowercase();
        let named = |name: &String| name != "*" && agent.contains(name.as_str());

        let specificity = self
            .groups
            .iter()
            .flat_map(|group| group.agents.iter())
            .filter(|name| named(name))
            .map(String::len)
            .max();
        let applies = |group: &&Group| match specificity {
            Some(len) => group.agents.iter().any(|name| named(name) && name.len() == len),
            None => group.agents.iter().any(|name| name == "*"),
        };

        self.groups
            .iter()
            .filter(applies)
            .flat_map(|group| group.rules.iter())
            .filter(|rule| pattern_matches(&rule.pattern, path))
            .map(|rule| (rule.pattern.len(), rule.allow))
            .max()
            .is_none_or(|(_, allow)| allow)
    }
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(pattern) => (pattern, true),
        None => (pattern, false),
    };
    let mut pieces = pattern.split('*');
    let Some(mut rest) = pieces.next().and_then(|head| path.strip_prefix(head)) else {
        return false;
    };

    let pieces: Vec<&str> = pieces.collect();
    for (index, piece) in pieces.iter().enumerate() {
        if anchored && index + 1 == pieces.len() {
            return rest.ends_with(piece);
        }
        match rest.find(piece) {
            Some(at) => rest = &rest[at + piece.len()..],
            None => return false,
        }
    }
    !anchored || rest.is_empty()
}

fn request_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

/// robots.txt of every origin the crawl touches, fetched once per origin.
#[derive(Debug)]
pub struct RobotsCache {
    client: Client,
    agent: String,
    origins: DashMap<String, Arc<OnceCell<RobotsTxt>>>,
}

impl RobotsCache {
    /// `user_agent` is reduced to its product token, `newscrawl/0.1` to `newscrawl`.
    pub fn new(client: Client, user_agent: &str) -> Self {
        let agent = user_agent
            .split(['/', ' '])
            .next()
            .unwrap_or(user_agent)
            .to_string();
        Self {
            client,
            agent,
            origins: DashMap::new(),
        }
    }

    pub async fn allows(&self, url: &Url) -> bool {
        let origin = url.origin().ascii_serialization();
        let cell = self.origins.entry(origin.clone()).or_default().clone();
        let robots = cell.get_or_init(|| self.load(&origin)).await;
        robots.is_allowed(&self.agent, &request_path(url))
    }

    async fn load(&self, origin: &str) -> RobotsTxt {
        let url = format!("{origin}/robots.txt");
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(url = %url, error = %err, "robots.txt unreachable");
                return RobotsTxt::default();
            }
        };
        if !response.status().is_success() {
            debug!(url = %url, status = %response.status(), "no robots.txt");
            return RobotsTxt::default();
        }
        match response.bytes().await {
            Ok(body) => {
                let body = &body[..body.len().min(MAX_ROBOTS_BYTES)];
                debug!(url = %url, bytes = body.len(), "loaded robots.txt");
                RobotsTxt::parse(&String::from_utf8_lossy(body))
            }
            Err(err) => {
                warn!(url = %url, error = %err, "robots.txt body failed");
                RobotsTxt::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[test]
    fn test_parse_and_match() {
        let robots = RobotsTxt::parse(
            "# comment\n\
             User-agent: *\n\
             Disallow: /private/\n\
             Allow: /private/press/ # public\n\
             Crawl-delay: 2\n\
             \n\
             Sitemap: https://news.test/sitemap.xml\n",
        );
        assert!(robots.is_allowed("newscrawl", "/world/story"));
        assert!(!robots.is_allowed("newscrawl", "/private/notes"));
        assert!(robots.is_allowed("newscrawl", "/private/press/release"));
    }

    #[test]
    fn test_most_specific_group_applies() {
        let robots = RobotsTxt::parse(
            "User-agent: *\nDisallow: /\n\n\
             User-agent: newscrawl\nUser-agent: otherbot\nDisallow: /drafts/\n",
        );
        assert!(robots.is_allowed("NewsCrawl", "/world/story"));
        assert!(!robots.is_allowed("newscrawl", "/drafts/a"));
        assert!(!robots.is_allowed("somebot", "/world/story"));
    }

    #[test]
    fn test_wildcards_and_anchors() {
        let robots = RobotsTxt::parse(
            "User-agent: *\nDisallow: /*.pdf$\nDisallow: /search*q=\nAllow: /search/help\n",
        );
        assert!(!robots.is_allowed("bot", "/files/report.pdf"));
        assert!(robots.is_allowed("bot", "/files/report.pdf.html"));
        assert!(!robots.is_allowed("bot", "/search?q=rates"));
        assert!(robots.is_allowed("bot", "/search/help"));
        assert!(robots.is_allowed("bot", "/searching"));
    }

    #[test]
    fn test_empty_or_unrelated_rules_allow_everything() {
        assert!(RobotsTxt::parse("").is_allowed("bot", "/a"));
        assert!(RobotsTxt::parse("Disallow: /\n").is_allowed("bot", "/a"));
        assert!(RobotsTxt::parse("User-agent: *\nDisallow:\n").is_allowed("bot", "/a"));
    }

    #[tokio::test]
    async fn test_cache_fetches_once_per_origin() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /video/\n"))
            .expect(1)
            .mount(&server)
            .await;

        let cache = RobotsCache::new(Client::new(), "newscrawl/0.1");
        let url = |path: &str| Url::parse(&format!("{}{path}", server.uri())).unwrap();
        assert!(cache.allows(&url("/news/2018/rates")).await);
        assert!(!cache.allows(&url("/video/2018/clip")).await);
        assert!(cache.allows(&url("/news/2018/jobs?page=2")).await);
    }

    #[tokio::test]
    async fn test_missing_robots_allows_everything() {
        let server = MockServer::start().await;
        let cache = RobotsCache::new(Client::new(), "newscrawl");
        let url = Url::parse(&format!("{}/anything", server.uri())).unwrap();
        assert!(cache.allows(&url).await);
    }
}
