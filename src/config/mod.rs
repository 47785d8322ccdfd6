//! Runtime configuration for the crawler binaries.
//!
//! Every setting comes from a `NEWSCRAWL_*` environment variable and falls
//! back to a development default. `Config::from_env` validates numbers and
//! flags and reports the first bad value as a `ConfigError`.

use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::crawler::CrawlConfig;
use crate::extractor::AdmissionPolicy;
use crate::fetcher::client::{DEFAULT_MAX_BODY_BYTES, DEFAULT_USER_AGENT};

/// Environment variable names.
pub const ENV_USER_AGENT: &str = "NEWSCRAWL_USER_AGENT";
pub const ENV_CONCURRENCY: &str = "NEWSCRAWL_CONCURRENCY";
pub const ENV_MAX_PAGES: &str = "NEWSCRAWL_MAX_PAGES";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "NEWSCRAWL_REQUEST_TIMEOUT_SECS";
pub const ENV_HEAD_TIMEOUT_SECS: &str = "NEWSCRAWL_HEAD_TIMEOUT_SECS";
pub const ENV_MAX_FETCH_ATTEMPTS: &str = "NEWSCRAWL_MAX_FETCH_ATTEMPTS";
pub const ENV_BASE_BACKOFF_MS: &str = "NEWSCRAWL_BASE_BACKOFF_MS";
pub const ENV_MAX_BODY_BYTES: &str = "NEWSCRAWL_MAX_BODY_BYTES";
pub const ENV_OUTPUT_DIR: &str = "NEWSCRAWL_OUTPUT_DIR";
pub const ENV_SITES_FILE: &str = "NEWSCRAWL_SITES_FILE";
pub const ENV_TARGET_LANGUAGE: &str = "NEWSCRAWL_TARGET_LANGUAGE";
pub const ENV_MIN_LANGUAGE_WORDS: &str = "NEWSCRAWL_MIN_LANGUAGE_WORDS";
pub const ENV_BACKFILL_MEDIA: &str = "NEWSCRAWL_BACKFILL_MEDIA";
pub const ENV_RESPECT_ROBOTS: &str = "NEWSCRAWL_RESPECT_ROBOTS";

/// Default development values used when environment variables are absent.
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_MAX_PAGES: usize = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HEAD_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_FETCH_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_BACKOFF_MS: u64 = 500;
const DEFAULT_OUTPUT_DIR: &str = "./articles";
const DEFAULT_TARGET_LANGUAGE: &str = "en";
const DEFAULT_MIN_LANGUAGE_WORDS: usize = 20;

/// Application runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    user_agent: String,
    concurrency: usize,
    max_pages: usize,
    request_timeout_secs: u64,
    head_timeout_secs: u64,
    max_fetch_attempts: u32,
    base_backoff_ms: u64,
    max_body_bytes: u64,
    output_dir: PathBuf,
    sites_file: Option<PathBuf>,
    target_language: String,
    min_language_words: usize,
    backfill_media: bool,
    respect_robots: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            max_pages: DEFAULT_MAX_PAGES,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            head_timeout_secs: DEFAULT_HEAD_TIMEOUT_SECS,
            max_fetch_attempts: DEFAULT_MAX_FETCH_ATTEMPTS,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            sites_file: None,
            target_language: DEFAULT_TARGET_LANGUAGE.to_string(),
            min_language_words: DEFAULT_MIN_LANGUAGE_WORDS,
            backfill_media: false,
            respect_robots: true,
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T>(key: &str, field: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match var(key) {
        Some(raw) => raw.parse().map_err(|err: T::Err| ConfigError::InvalidValue {
            field,
            reason: format!("{raw:?}: {err}"),
        }),
        None => Ok(default),
    }
}

fn parse_positive<T>(key: &str, field: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: Display,
{
    let value = parse_var(key, field, default)?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn parse_flag(key: &str, field: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = var(key) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field,
            reason: format!("{raw:?} is not a boolean"),
        }),
    }
}

impl Config {
    /// Load from environment variables, falling back to development defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let target_language = var(ENV_TARGET_LANGUAGE)
            .unwrap_or_else(|| DEFAULT_TARGET_LANGUAGE.to_string())
            .to_ascii_lowercase();
        if !target_language.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::InvalidValue {
                field: "target_language",
                reason: format!("{target_language:?} is not a language code"),
            });
        }

        Ok(Self {
            user_agent: var(ENV_USER_AGENT).unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            concurrency: parse_positive(ENV_CONCURRENCY, "concurrency", DEFAULT_CONCURRENCY)?,
            max_pages: parse_positive(ENV_MAX_PAGES, "max_pages", DEFAULT_MAX_PAGES)?,
            request_timeout_secs: parse_positive(
                ENV_REQUEST_TIMEOUT_SECS,
                "request_timeout_secs",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
            head_timeout_secs: parse_positive(
                ENV_HEAD_TIMEOUT_SECS,
                "head_timeout_secs",
                DEFAULT_HEAD_TIMEOUT_SECS,
            )?,
            max_fetch_attempts: parse_positive(
                ENV_MAX_FETCH_ATTEMPTS,
                "max_fetch_attempts",
                DEFAULT_MAX_FETCH_ATTEMPTS,
            )?,
            base_backoff_ms: parse_var(ENV_BASE_BACKOFF_MS, "base_backoff_ms", DEFAULT_BASE_BACKOFF_MS)?,
            max_body_bytes: parse_positive(ENV_MAX_BODY_BYTES, "max_body_bytes", DEFAULT_MAX_BODY_BYTES)?,
            output_dir: var(ENV_OUTPUT_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            sites_file: var(ENV_SITES_FILE).map(PathBuf::from),
            target_language,
            min_language_words: parse_var(
                ENV_MIN_LANGUAGE_WORDS,
                "min_language_words",
                DEFAULT_MIN_LANGUAGE_WORDS,
            )?,
            backfill_media: parse_flag(ENV_BACKFILL_MEDIA, "backfill_media", false)?,
            respect_robots: parse_flag(ENV_RESPECT_ROBOTS, "respect_robots", true)?,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
    pub fn max_pages(&self) -> usize {
        self.max_pages
    }
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
    /// Timeout of the media HEAD probes.
    pub fn head_timeout(&self) -> Duration {
        Duration::from_secs(self.head_timeout_secs)
    }
    pub fn max_fetch_attempts(&self) -> u32 {
        self.max_fetch_attempts
    }
    pub fn base_backoff_ms(&self) -> u64 {
        self.base_backoff_ms
    }
    pub fn max_body_bytes(&self) -> u64 {
        self.max_body_bytes
    }
    /// Root directory of the file blob store.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
    /// Site table replacing the built-in one.
    pub fn sites_file(&self) -> Option<&Path> {
        self.sites_file.as_deref()
    }
    pub fn target_language(&self) -> &str {
        &self.target_language
    }
    pub fn min_language_words(&self) -> usize {
        self.min_language_words
    }
    pub fn backfill_media(&self) -> bool {
        self.backfill_media
    }
    /// Consult robots.txt before fetching.
    pub fn respect_robots(&self) -> bool {
        self.respect_robots
    }

    pub fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            concurrency: self.concurrency,
            max_pages: self.max_pages,
            max_fetch_attempts: self.max_fetch_attempts,
            base_backoff_ms: self.base_backoff_ms,
        }
    }

    pub fn admission_policy(&self) -> AdmissionPolicy {
        AdmissionPolicy::new(self.target_language.clone(), self.min_language_words)
    }
}

/// Errors that can occur while building a configuration.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Ensure environment-variable manipulating tests run serially.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ALL_VARS: [&str; 14] = [
        ENV_USER_AGENT,
        ENV_CONCURRENCY,
        ENV_MAX_PAGES,
        ENV_REQUEST_TIMEOUT_SECS,
        ENV_HEAD_TIMEOUT_SECS,
        ENV_MAX_FETCH_ATTEMPTS,
        ENV_BASE_BACKOFF_MS,
        ENV_MAX_BODY_BYTES,
        ENV_OUTPUT_DIR,
        ENV_SITES_FILE,
        ENV_TARGET_LANGUAGE,
        ENV_MIN_LANGUAGE_WORDS,
        ENV_BACKFILL_MEDIA,
        ENV_RESPECT_ROBOTS,
    ];

    fn clear_env() {
        for key in ALL_VARS {
            unsafe {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn defaults_when_env_missing() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.crawl_config(), CrawlConfig::default());
        assert_eq!(cfg.output_dir(), Path::new("./articles"));
        assert_eq!(cfg.sites_file(), None);
        assert!(!cfg.backfill_media());
        assert!(cfg.respect_robots());
        assert_eq!(cfg.admission_policy(), AdmissionPolicy::default());
    }

    #[test]
    fn overrides_when_env_present() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var(ENV_USER_AGENT, "TestBot/1.0");
            env::set_var(ENV_CONCURRENCY, "8");
            env::set_var(ENV_MAX_PAGES, " 20 ");
            env::set_var(ENV_REQUEST_TIMEOUT_SECS, "10");
            env::set_var(ENV_BASE_BACKOFF_MS, "0");
            env::set_var(ENV_OUTPUT_DIR, "/tmp/out");
            env::set_var(ENV_SITES_FILE, "sites.json");
            env::set_var(ENV_TARGET_LANGUAGE, "DE");
            env::set_var(ENV_BACKFILL_MEDIA, "yes");
            env::set_var(ENV_RESPECT_ROBOTS, "off");
        }
        let cfg = Config::from_env().unwrap();
        clear_env();

        assert_eq!(cfg.user_agent(), "TestBot/1.0");
        assert_eq!(cfg.concurrency(), 8);
        assert_eq!(cfg.max_pages(), 20);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.base_backoff_ms(), 0);
        assert_eq!(cfg.output_dir(), Path::new("/tmp/out"));
        assert_eq!(cfg.sites_file(), Some(Path::new("sites.json")));
        assert_eq!(cfg.target_language(), "de");
        assert!(cfg.backfill_media());
        assert!(!cfg.respect_robots());
    }

    #[test]
    fn invalid_values_are_reported() {
        let _guard = ENV_MUTEX.lock().unwrap();
        for (key, value, field) in [
            (ENV_CONCURRENCY, "many", "concurrency"),
            (ENV_MAX_PAGES, "0", "max_pages"),
            (ENV_MAX_FETCH_ATTEMPTS, "-1", "max_fetch_attempts"),
            (ENV_BACKFILL_MEDIA, "maybe", "backfill_media"),
            (ENV_RESPECT_ROBOTS, "sometimes", "respect_robots"),
            (ENV_TARGET_LANGUAGE, "en-1", "target_language"),
        ] {
            clear_env();
            unsafe {
                env::set_var(key, value);
            }
            let err = Config::from_env().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { field: f, .. } if f == field),
                "{key}={value} gave {err}"
            );
        }
        clear_env();
    }
}
