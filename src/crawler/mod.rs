pub mod backoff;
pub mod robots;

pub use backoff::calculate_backoff_delay;
pub use robots::{RobotsCache, RobotsTxt};

use dashmap::DashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::{sync::Semaphore, task::JoinSet, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};
use url::Url;

use crate::article::{ArticleError, ArticleRecord, MediaProbe};
use crate::extractor::AdmissionPolicy;
use crate::fetcher::{FetchError, Fetcher, Page};
use crate::links::discover;
use crate::sites::{Parsed, SiteRegistry};
use crate::storage::{BlobStore, Persisted, persist_if_absent};

/// Crawl configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    pub concurrency: usize,
    pub max_pages: usize,
    pub max_fetch_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_pages: 500,
            max_fetch_attempts: 3,
            base_backoff_ms: 500,
        }
    }
}

/// What happened to one scheduled URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStatus {
    /// Never fetched: robots.txt disallows it.
    Disallowed,
    FetchFailed,
    /// Served from a host no site claims, e.g. after a redirect.
    Unclaimed,
    NotArticle,
    Invalid,
    Rejected,
    Written(String),
    Unchanged(String),
    StorageFailed,
}

/// Domain of the claiming site and its parse of the page.
type SiteParse = (String, Result<Option<Parsed>, ArticleError>);

#[derive(Debug)]
struct PageOutcome {
    final_url: Option<Url>,
    discovered: Vec<Url>,
    status: PageStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub scheduled: usize,
    pub disallowed: usize,
    pub fetched: usize,
    pub fetch_failures: usize,
    pub articles: usize,
    pub invalid: usize,
    pub rejected: usize,
    pub written: usize,
    pub unchanged: usize,
    pub storage_failures: usize,
}

impl CrawlStats {
    fn record(&mut self, status: &PageStatus) {
        if !matches!(status, PageStatus::Disallowed | PageStatus::FetchFailed) {
            self.fetched += 1;
        }
        match status {
            PageStatus::Disallowed => self.disallowed += 1,
            PageStatus::FetchFailed => self.fetch_failures += 1,
            PageStatus::Unclaimed | PageStatus::NotArticle => {}
            PageStatus::Invalid => self.invalid += 1,
            PageStatus::Rejected => {
                self.articles += 1;
                self.rejected += 1;
            }
            PageStatus::Written(_) => {
                self.articles += 1;
                self.written += 1;
            }
            PageStatus::Unchanged(_) => {
                self.articles += 1;
                self.unchanged += 1;
            }
            PageStatus::StorageFailed => {
                self.articles += 1;
                self.storage_failures += 1;
            }
        }
    }
}

/// Everything a page task needs, shared across tasks.
#[derive(Clone)]
struct CrawlContext {
    fetcher: Arc<dyn Fetcher>,
    sites: Arc<SiteRegistry>,
    store: Arc<dyn BlobStore>,
    admission: AdmissionPolicy,
    probe: Option<MediaProbe>,
    robots: Option<Arc<RobotsCache>>,
    config: CrawlConfig,
    shutdown_token: CancellationToken,
}

/// Cooperative crawl over the sites of a registry.
pub struct Crawler {
    context: CrawlContext,
    seen: DashSet<String>,
}

impl Crawler {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        sites: Arc<SiteRegistry>,
        store: Arc<dyn BlobStore>,
        config: CrawlConfig,
    ) -> Self {
        Self {
            context: CrawlContext {
                fetcher,
                sites,
                store,
                admission: AdmissionPolicy::default(),
                probe: None,
                robots: None,
                config,
                shutdown_token: CancellationToken::new(),
            },
            seen: DashSet::new(),
        }
    }

    pub fn with_admission(mut self, admission: AdmissionPolicy) -> Self {
        self.context.admission = admission;
        self
    }

    /// HEAD-probe article media before persisting.
    pub fn with_media_probe(mut self, probe: MediaProbe) -> Self {
        self.context.probe = Some(probe);
        self
    }

    /// Skip pages the origin's robots.txt disallows.
    pub fn with_robots(mut self, robots: RobotsCache) -> Self {
        self.context.robots = Some(Arc::new(robots));
        self
    }

    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.context.shutdown_token = token;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.context.shutdown_token.clone()
    }

    /// Start URLs of every registered site.
    pub fn start_urls(&self) -> Vec<Url> {
        self.context
            .sites
            .sites()
            .iter()
            .flat_map(|site| site.start_urls().iter().cloned())
            .collect()
    }

    /// Frontier key: the site's canonical form, or the URL without its
    /// fragment for hosts no site claims.
    fn frontier_key(&self, url: &Url) -> String {
        self.context
            .sites
            .for_url(url)
            .and_then(|site| site.canonical_url(url))
            .unwrap_or_else(|| {
                let mut url = url.clone();
                url.set_fragment(None);
                url
            })
            .to_string()
    }

    /// Mark `url` as seen. Returns false when it already was.
    fn mark_seen(&self, url: &Url) -> bool {
        self.seen.insert(self.frontier_key(url))
    }

    /// Crawl breadth-first from `seeds` until the frontier is exhausted,
    /// `max_pages` pages were scheduled, or shutdown is requested. Pages
    /// already in flight finish on shutdown.
    #[instrument(skip_all)]
    pub async fn run(&self, seeds: impl IntoIterator<Item = Url>) -> CrawlStats {
        let config = &self.context.config;
        let shutdown_token = &self.context.shutdown_token;
        info!(
            concurrency = config.concurrency,
            max_pages = config.max_pages,
            max_fetch_attempts = config.max_fetch_attempts,
            "starting crawl"
        );

        let mut queue: VecDeque<Url> = seeds.into_iter().filter(|url| self.mark_seen(url)).collect();
        let context = Arc::new(self.context.clone());
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut stats = CrawlStats::default();

        loop {
            while stats.scheduled < config.max_pages && !shutdown_token.is_cancelled() {
                let Some(url) = queue.pop_front() else {
                    break;
                };
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                stats.scheduled += 1;

                let context = context.clone();
                let span = info_span!("page", url = %url);
                tasks.spawn(
                    async move {
                        let _permit = permit; // Hold permit until the page completes
                        context.process(url).await
                    }
                    .instrument(span),
                );
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(error = %err, "page task failed");
                    stats.fetch_failures += 1;
                    continue;
                }
            };

            stats.record(&outcome.status);
            if let Some(final_url) = &outcome.final_url {
                self.mark_seen(final_url);
            }
            for link in outcome.discovered {
                if self.mark_seen(&link) {
                    queue.push_back(link);
                }
            }
        }

        if shutdown_token.is_cancelled() {
            info!(pending = queue.len(), "crawl stopped by shutdown");
        }
        info!(
            scheduled = stats.scheduled,
            fetched = stats.fetched,
            disallowed = stats.disallowed,
            articles = stats.articles,
            written = stats.written,
            unchanged = stats.unchanged,
            rejected = stats.rejected,
            "crawl finished"
        );
        stats
    }
}

impl CrawlContext {
    async fn process(&self, url: Url) -> PageOutcome {
        if let Some(robots) = &self.robots
            && !robots.allows(&url).await
        {
            info!("disallowed by robots.txt");
            return PageOutcome {
                final_url: None,
                discovered: Vec::new(),
                status: PageStatus::Disallowed,
            };
        }

        let page = match self.fetch_with_retry(&url).await {
            Ok(page) => page,
            Err(err) => {
                warn!(error = %err, "fetch failed");
                return PageOutcome {
                    final_url: None,
                    discovered: Vec::new(),
                    status: PageStatus::FetchFailed,
                };
            }
        };

        let (discovered, parsed) = self.analyse(&page);
        let status = match parsed {
            None => PageStatus::Unclaimed,
            Some((_, Ok(None))) => PageStatus::NotArticle,
            Some((_, Err(err))) => {
                warn!(error = %err, "article could not be normalized");
                PageStatus::Invalid
            }
            Some((domain, Ok(Some(parsed)))) => self.store_article(&page.url, &domain, parsed).await,
        };

        PageOutcome {
            final_url: Some(page.url),
            discovered,
            status,
        }
    }

    /// Links worth queueing and the parse result, if a site claims the page.
    /// Kept synchronous: parsed documents never live across an await.
    fn analyse(&self, page: &Page) -> (Vec<Url>, Option<SiteParse>) {
        let discovered = discover(&page.document(), &page.url)
            .into_iter()
            .filter(|link| {
                self.sites
                    .for_url(link)
                    .is_some_and(|site| site.should_queue(link))
            })
            .collect::<Vec<_>>();
        debug!(links = discovered.len(), "discovered links");

        let parsed = self
            .sites
            .for_url(&page.url)
            .map(|site| (site.domain().to_string(), site.parse(page)));
        (discovered, parsed)
    }

    async fn store_article(&self, page_url: &Url, domain: &str, parsed: Parsed) -> PageStatus {
        let Parsed {
            mut article,
            link_id,
        } = parsed;

        if let Err(rejection) = self.admission.admit(&article) {
            info!(link_id = %link_id, reason = %rejection, "article rejected");
            return PageStatus::Rejected;
        }
        if let Some(probe) = &self.probe {
            article.backfill_media(probe).await;
        }

        let record = ArticleRecord::new(article, page_url);
        match persist_if_absent(self.store.as_ref(), &record, domain, &link_id).await {
            Ok(Persisted::Written(key)) => {
                info!(key = %key, "article stored");
                PageStatus::Written(key)
            }
            Ok(Persisted::Unchanged(key)) => PageStatus::Unchanged(key),
            Err(err) => {
                error!(link_id = %link_id, error = %err, "failed to store article");
                PageStatus::StorageFailed
            }
        }
    }

    async fn fetch_with_retry(&self, url: &Url) -> Result<Page, FetchError> {
        let max_attempts = self.config.max_fetch_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.fetcher.fetch(url).await {
                Ok(page) => return Ok(page),
                Err(err) => err,
            };
            if !err.should_retry() || attempt >= max_attempts {
                return Err(err);
            }

            let delay = calculate_backoff_delay(attempt - 1, self.config.base_backoff_ms);
            debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "fetch will retry"
            );
            tokio::select! {
                _ = self.shutdown_token.cancelled() => return Err(err),
                _ = sleep(delay) => {}
            }
        }
    }
}
