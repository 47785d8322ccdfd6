//! Hydration state embedded in inline scripts.
//!
//! Each inline script runs on its own in the [`crate::script`] sandbox; the
//! first one that assigns the profile's global provides the state. Scripts
//! that fail or never assign it contribute nothing. `application/json`
//! blocks whose `id` equals the global are read directly.

pub mod blocks;
pub mod fields;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

use crate::article::Article;
use crate::script::{Limits, run_script};

static SCRIPT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script:not([src])").unwrap());

const SCRIPT_TYPES: &[&str] = &[
    "",
    "text/javascript",
    "application/javascript",
    "application/x-javascript",
    "text/ecmascript",
    "module",
];

/// Where a site keeps its state and how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateProfile {
    /// Global the state is assigned to, e.g. `__preloadedData`.
    pub global: String,
    /// JSON pointer into the global, e.g. `/initialState`.
    #[serde(default)]
    pub pointer: Option<String>,
    pub schema: StateSchema,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateSchema {
    /// Flat `id -> node` table of `__typename`-tagged nodes.
    BlockTree,
    /// Plain object read through JSON pointers.
    Fields(fields::FieldMap),
}

/// The state value named by `profile`, if any script provides it.
pub fn find_state(document: &Html, profile: &StateProfile, limits: &Limits) -> Option<Value> {
    for script in document.select(&SCRIPT_SELECTOR) {
        let kind = script
            .value()
            .attr("type")
            .map(|kind| kind.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let source = script.text().collect::<String>();

        let state = if kind == "application/json" {
            if script.value().attr("id") != Some(profile.global.as_str()) {
                continue;
            }
            match serde_json::from_str::<Value>(&source) {
                Ok(value) => Some(value),
                Err(err) => {
                    debug!(global = %profile.global, error = %err, "state block is not valid JSON");
                    None
                }
            }
        } else if SCRIPT_TYPES.contains(&kind.as_str()) {
            if !source.contains(profile.global.as_str()) {
                continue;
            }
            let mut outcome = run_script(&source, limits);
            if let Some(err) = &outcome.error {
                debug!(global = %profile.global, error = %err, "script stopped early");
            }
            outcome.globals.remove(&profile.global)
        } else {
            continue;
        };

        let state = match (&profile.pointer, state) {
            (Some(pointer), Some(state)) => state.pointer(pointer).cloned(),
            (None, state) => state,
            (_, None) => None,
        };
        if let Some(state) = state.filter(|state| !state.is_null()) {
            return Some(state);
        }
    }
    None
}

/// Apply the site's state to the article. Returns whether it contributed.
pub fn apply_state(
    article: &mut Article,
    document: &Html,
    profile: &StateProfile,
    limits: &Limits,
    base: &Url,
) -> bool {
    let Some(state) = find_state(document, profile, limits) else {
        debug!(global = %profile.global, "no state container");
        return false;
    };
    match &profile.schema {
        StateSchema::BlockTree => blocks::apply(article, &state, base),
        StateSchema::Fields(map) => fields::apply(article, &state, map, base),
    }
}
