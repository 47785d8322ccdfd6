//! Normalize one saved page and print the article record as JSON.
//!
//! Usage: `extract <file.html> <url>`. The URL picks the site profile; hosts
//! without one fall back to a bare profile that relies on page metadata.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use tracing::warn;
use url::Url;

use newscrawl::{
    article::ArticleRecord,
    config::Config,
    extractor::normalize,
    fetcher::pipeline::process_response,
    sites::{Site, SiteProfile, SiteRegistry},
    telemetry,
};

fn main() -> Result<()> {
    telemetry::init();

    let mut args = std::env::args().skip(1);
    let (Some(path), Some(url)) = (args.next(), args.next()) else {
        bail!("usage: extract <file.html> <url>");
    };
    let path = PathBuf::from(path);
    let url = Url::parse(&url).with_context(|| format!("invalid url {url:?}"))?;

    let config = Config::from_env()?;
    let registry = match config.sites_file() {
        Some(sites) => SiteRegistry::from_path(sites)?,
        None => SiteRegistry::builtin()?,
    };

    let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let page = process_response(url.clone(), &bytes, "text/html")?;

    let fallback;
    let site = match registry.for_url(&url) {
        Some(site) => site,
        None => {
            let host = url.host_str().context("url has no host")?;
            fallback = Site::compile(SiteProfile {
                domain: host.to_string(),
                ..SiteProfile::default()
            })?;
            &fallback
        }
    };
    if site.url_parse(&url).is_none() {
        warn!(url = %url, site = site.domain(), "url is not an article for this site");
    }

    let article = normalize(&page, site)?;
    if let Err(rejection) = config.admission_policy().admit(&article) {
        warn!(url = %url, %rejection, "article would not be admitted");
    }

    let record = ArticleRecord::new(article, &url);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
