//! Last checks before an article is persisted.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::article::{Article, is_blank};
use crate::extractor::language::detect_language;

const MAX_BOILERPLATE_RATIO: f64 = 0.3;

const BOILERPLATE_KEYWORDS: &[&str] = &[
    "cookie",
    "privacy",
    "terms",
    "policy",
    "gdpr",
    "consent",
    "accept",
    "decline",
    "preferences",
    "tracking",
    "advertisement",
    "subscribe",
    "newsletter",
    "login",
    "sign up",
    "register",
    "password",
    "404",
    "not found",
    "access denied",
    "please wait",
    "javascript",
    "enable",
    "browser",
    "click here",
];

/// Whole-word keyword matches, plurals included.
static BOILERPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = BOILERPLATE_KEYWORDS.iter().map(|k| regex::escape(k)).collect();
    Regex::new(&format!(r"\b(?:{})s?\b", alternatives.join("|"))).unwrap()
});

#[derive(Debug, Error, PartialEq)]
pub enum Rejection {
    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("detected language {detected}, expected {target}")]
    Language { detected: String, target: String },

    #[error("boilerplate ratio {ratio:.2} above limit")]
    Boilerplate { ratio: f64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionPolicy {
    target_language: String,
    min_language_words: usize,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::new("en", 20)
    }
}

impl AdmissionPolicy {
    pub fn new(target_language: impl Into<String>, min_language_words: usize) -> Self {
        Self {
            target_language: target_language.into().to_ascii_lowercase(),
            min_language_words,
        }
    }

    pub fn target_language(&self) -> &str {
        &self.target_language
    }

    pub fn min_language_words(&self) -> usize {
        self.min_language_words
    }

    /// Structural gate, then boilerplate gate, then language gate.
    pub fn admit(&self, article: &Article) -> Result<(), Rejection> {
        if is_blank(&article.info.title) {
            return Err(Rejection::MissingField("title"));
        }
        if is_blank(&article.info.url) {
            return Err(Rejection::MissingField("url"));
        }
        let text = article.text.plaintext.trim();
        if text.is_empty() {
            return Err(Rejection::MissingField("body text"));
        }

        let ratio = boilerplate_ratio(text);
        if ratio > MAX_BOILERPLATE_RATIO {
            return Err(Rejection::Boilerplate { ratio });
        }

        if let Some(detected) = detect_language(text, self.min_language_words)
            && detected != self.target_language
        {
            return Err(Rejection::Language {
                detected,
                target: self.target_language.clone(),
            });
        }
        Ok(())
    }
}

/// Boilerplate keyword occurrences per word.
fn boilerplate_ratio(text: &str) -> f64 {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0.0;
    }
    let hits = BOILERPLATE_REGEX.find_iter(&text.to_lowercase()).count();
    hits as f64 / words as f64
}
