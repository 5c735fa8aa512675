//! Caching Middleware
//!
//! Per-route caching for axum: request parameters, key templates, rules,
//! response capture, the hit callback chain and the engine tying them together.

mod capture;
mod engine;
mod hit;
mod key;
mod params;
mod rules;

pub use capture::{capture, snapshot_headers, CapturedResponse};
pub use engine::CacheEngine;
pub use hit::{replay, HitHandler, DEFAULT_CONTENT_TYPE};
pub use key::{KeyFn, KeySpec};
pub use params::{is_body_method, is_read_method, ParamValue, RequestParams};
pub use rules::{Cacheable, Caching, EvictRule, HitCallback};
