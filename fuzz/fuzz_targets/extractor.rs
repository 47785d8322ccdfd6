#![no_main]

use libfuzzer_sys::fuzz_target;
use url::Url;

use newscrawl::extractor::normalize;
use newscrawl::fetcher::pipeline::process_response;
use newscrawl::sites::SiteRegistry;

fuzz_target!(|data: &[u8]| {
    let registry = SiteRegistry::builtin().unwrap();

    // Every built-in site must survive arbitrary bytes, including charset sniffing
    for url in [
        "https://www.nytimes.com/2018/10/18/business/fed-rates.html",
        "https://edition.cnn.com/2018/10/18/politics/fed-rates/index.html",
        "https://www.nzherald.co.nz/nz/news/article.cfm?c_id=1&objectid=12145563",
    ] {
        let url = Url::parse(url).unwrap();
        let Ok(page) = process_response(url.clone(), data, "text/html") else {
            continue;
        };
        if let Some(site) = registry.for_url(&url) {
            let _ = normalize(&page, site);
        }
    }
});
