//! Sandboxed evaluation of inline page scripts.
//!
//! Hydration scripts assign JSON-like object graphs to globals
//! (`window.__NUXT__ = (function(a){return {...}}(1))`,
//! `window["titanium-state"] = {...}`). This module evaluates exactly that
//! subset: declarations and assignments whose right-hand sides are
//! literals, identifiers, member reads, `||`/`&&`/`??`/ternaries,
//! `JSON.parse`, and plain `function` expressions with `return`. Anything
//! else (loops, `new`, regex literals, closures over mutable state) is an
//! error. Every run is bounded by source length, a step budget that also
//! pays for copied bytes, a nesting limit and a per-value size cap.

pub mod eval;
pub mod lexer;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("script of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("{name} is not defined")]
    Reference { name: String },

    #[error("type error: {0}")]
    Type(String),

    #[error("unsupported {construct} at byte {offset}")]
    Unsupported {
        offset: usize,
        construct: &'static str,
    },

    #[error("step budget exhausted")]
    BudgetExhausted,

    #[error("nesting deeper than {0}")]
    TooDeep(usize),

    #[error("value exceeds the {limit} byte limit")]
    ValueTooLarge { limit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_script_bytes: usize,
    /// Shared budget for tokens read and bytes copied.
    pub max_steps: usize,
    pub max_depth: usize,
    /// Largest value a binding may hold, measured roughly in bytes.
    pub max_value_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_script_bytes: 4 * 1024 * 1024,
            max_steps: 2_000_000,
            max_depth: 96,
            max_value_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Globals assigned by one script, and the error that stopped it, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutcome {
    pub globals: Map<String, Value>,
    pub error: Option<ScriptError>,
}

impl ScriptOutcome {
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }
}

/// Evaluate one script in a fresh global scope.
///
/// An error stops the script; globals assigned before it are kept.
pub fn run_script(source: &str, limits: &Limits) -> ScriptOutcome {
    if source.len() > limits.max_script_bytes {
        return ScriptOutcome {
            globals: Map::new(),
            error: Some(ScriptError::TooLarge {
                size: source.len(),
                limit: limits.max_script_bytes,
            }),
        };
    }
    let (tokens, lex_error) = lexer::tokenize(source);
    eval::Interpreter::new(&tokens, lex_error, limits).run()
}
