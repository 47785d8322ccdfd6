pub mod client;
pub mod errors;
pub mod pipeline;
pub mod types;

use async_trait::async_trait;
use url::Url;

pub use client::HttpFetcher;
pub use errors::FetchError;
pub use types::{Charset, Page};

/// Source of pages for the crawler. A browser-backed implementation can
/// stand in for [`HttpFetcher`] when pages need JavaScript rendering.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Page, FetchError>;
}
