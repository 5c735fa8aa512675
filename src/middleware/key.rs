//! Key Resolver
//!
//! Turns a key specification plus request parameters into a concrete,
//! lowercase cache key.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::params::RequestParams;

/// Matches `#name#` placeholders, shortest first.
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#(.*?)#").expect("placeholder pattern is valid"));

/// A key-generating function over the request parameters.
pub type KeyFn = Arc<dyn Fn(&RequestParams) -> String + Send + Sync>;

// == Key Spec ==
/// How a route derives its cache key.
#[derive(Clone)]
pub enum KeySpec {
    /// Literal text with `#name#` placeholders, e.g. `anson:userId:#id# hash:#hash#`
    Template(String),
    /// Arbitrary function of the request parameters
    Function(KeyFn),
}

impl KeySpec {
    pub fn template(template: impl Into<String>) -> Self {
        KeySpec::Template(template.into())
    }

    /// Template prefixed with a cache name: `"{cache_name}:{key}"`.
    pub fn named(cache_name: &str, key: &str) -> Self {
        KeySpec::Template(format!("{}:{}", cache_name, key))
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&RequestParams) -> String + Send + Sync + 'static,
    {
        KeySpec::Function(Arc::new(f))
    }

    /// Placeholder names in left-to-right order. Empty for function specs.
    pub fn placeholders(&self) -> Vec<&str> {
        match self {
            KeySpec::Template(template) => PLACEHOLDER
                .captures_iter(template)
                .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
                .collect(),
            KeySpec::Function(_) => Vec::new(),
        }
    }

    // == Resolve ==
    /// Builds the key. Absent parameters render as empty text.
    pub fn resolve(&self, params: &RequestParams) -> String {
        let key = match self {
            KeySpec::Template(template) => PLACEHOLDER
                .replace_all(template, |caps: &Captures| params.get(&caps[1]).to_string())
                .into_owned(),
            KeySpec::Function(f) => f(params),
        };
        key.to_lowercase()
    }

    /// Builds the key only if every named placeholder has a value.
    ///
    /// Function specs cannot be inspected, so they always resolve.
    pub fn resolve_strict(&self, params: &RequestParams) -> Option<String> {
        let missing = self
            .placeholders()
            .into_iter()
            .any(|name| !name.is_empty() && !params.contains(name));

        if missing {
            None
        } else {
            Some(self.resolve(params))
        }
    }
}

impl fmt::Debug for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySpec::Template(template) => f.debug_tuple("Template").field(template).finish(),
            KeySpec::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl From<&str> for KeySpec {
    fn from(template: &str) -> Self {
        KeySpec::template(template)
    }
}

impl From<String> for KeySpec {
    fn from(template: String) -> Self {
        KeySpec::Template(template)
    }
}
