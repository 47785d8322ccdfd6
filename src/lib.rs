pub mod article;
pub mod config;
pub mod crawler;
pub mod extractor;
pub mod fetcher;
pub mod links;
pub mod script;
pub mod sites;
pub mod storage;
pub mod telemetry;
