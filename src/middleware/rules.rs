//! Caching Rules
//!
//! Per-route declarations: which key to cache under, what to evict, and who
//! answers a cache hit.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;

use super::key::{KeyFn, KeySpec};
use super::params::RequestParams;
use crate::cache::CacheItem;

/// Writes the response for a cache hit.
pub type HitCallback = Arc<dyn Fn(&CacheItem) -> Response + Send + Sync>;

// == Cacheable ==
/// Cache the route's response under `key`.
#[derive(Clone)]
pub struct Cacheable {
    pub key: KeySpec,
    /// Overrides the engine-level hit callback for this rule
    pub on_hit: Option<HitCallback>,
    /// Overrides the store's default TTL
    pub ttl: Option<Duration>,
}

impl Cacheable {
    pub fn new(key: impl Into<KeySpec>) -> Self {
        Self {
            key: key.into(),
            on_hit: None,
            ttl: None,
        }
    }

    pub fn on_hit<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CacheItem) -> Response + Send + Sync + 'static,
    {
        self.on_hit = Some(Arc::new(callback));
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

impl fmt::Debug for Cacheable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cacheable")
            .field("key", &self.key)
            .field("on_hit", &self.on_hit.is_some())
            .field("ttl", &self.ttl)
            .finish()
    }
}

// == Evict Rule ==
/// Remove keys or wildcard patterns when the route runs.
#[derive(Clone)]
pub enum EvictRule {
    /// `key` template applied under each cache name (`"{name}:{key}"`).
    /// With no cache names the template is used as-is.
    Template { cache_names: Vec<String>, key: String },
    /// Function producing one key or pattern
    Function(KeyFn),
}

impl EvictRule {
    /// A single template, e.g. `anson:userId:#id#*`.
    pub fn pattern(template: impl Into<String>) -> Self {
        EvictRule::Template {
            cache_names: Vec::new(),
            key: template.into(),
        }
    }

    /// The same key template under several cache names.
    pub fn named<I, S>(cache_names: I, key: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EvictRule::Template {
            cache_names: cache_names.into_iter().map(Into::into).collect(),
            key: key.into(),
        }
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&RequestParams) -> String + Send + Sync + 'static,
    {
        EvictRule::Function(Arc::new(f))
    }

    // == Resolve ==
    /// Concrete keys and patterns to evict for this request.
    ///
    /// A template whose placeholders are not all present yields nothing, so
    /// partial parameters never widen an eviction. Empty keys are dropped.
    pub fn resolve(&self, params: &RequestParams) -> Vec<String> {
        let specs: Vec<KeySpec> = match self {
            EvictRule::Template { cache_names, key } if cache_names.is_empty() => {
                vec![KeySpec::template(key.as_str())]
            }
            EvictRule::Template { cache_names, key } => cache_names
                .iter()
                .map(|name| KeySpec::named(name, key))
                .collect(),
            EvictRule::Function(f) => vec![KeySpec::Function(f.clone())],
        };

        specs
            .iter()
            .filter_map(|spec| spec.resolve_strict(params))
            .filter(|key| !key.is_empty())
            .collect()
    }
}

impl fmt::Debug for EvictRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictRule::Template { cache_names, key } => f
                .debug_struct("Template")
                .field("cache_names", cache_names)
                .field("key", key)
                .finish(),
            EvictRule::Function(_) => f.write_str("Function(..)"),
        }
    }
}

// == Caching ==
/// Everything the engine needs to know about one route.
///
/// Only the first cacheable rule is used to build the lookup key.
#[derive(Debug, Clone, Default)]
pub struct Caching {
    pub cacheable: Vec<Cacheable>,
    pub evict: Vec<EvictRule>,
}

impl Caching {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(mut self, rule: Cacheable) -> Self {
        self.cacheable.push(rule);
        self
    }

    pub fn evict(mut self, rule: EvictRule) -> Self {
        self.evict.push(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cacheable.is_empty() && self.evict.is_empty()
    }
}
