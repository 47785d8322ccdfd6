use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use newscrawl::{
    article::MediaProbe,
    config::Config,
    crawler::{Crawler, RobotsCache},
    fetcher::HttpFetcher,
    sites::SiteRegistry,
    storage::FsBlobStore,
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let config = Config::from_env()?;

    let sites = match config.sites_file() {
        Some(path) => SiteRegistry::from_path(path)
            .with_context(|| format!("loading sites from {}", path.display()))?,
        None => SiteRegistry::builtin().context("loading built-in sites")?,
    };
    info!(sites = sites.len(), "site registry loaded");

    let fetcher = HttpFetcher::new(config.user_agent(), config.request_timeout())
        .context("building http client")?
        .with_max_body_bytes(config.max_body_bytes());
    let store = FsBlobStore::new(config.output_dir());
    let robots = config
        .respect_robots()
        .then(|| RobotsCache::new(fetcher.client().clone(), config.user_agent()));

    let mut crawler = Crawler::new(
        Arc::new(fetcher),
        Arc::new(sites),
        Arc::new(store),
        config.crawl_config(),
    )
    .with_admission(config.admission_policy());
    if config.backfill_media() {
        let probe = MediaProbe::new(config.head_timeout()).context("building media probe")?;
        crawler = crawler.with_media_probe(probe);
    }
    if let Some(robots) = robots {
        crawler = crawler.with_robots(robots);
    }

    // Spawn signal handler
    let shutdown_token = crawler.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Received shutdown signal, finishing in-flight pages...");
        shutdown_token.cancel();
    });

    info!(output_dir = %config.output_dir().display(), "starting crawl");
    let stats = crawler.run(crawler.start_urls()).await;
    info!(?stats, "crawl finished");
    Ok(())
}
