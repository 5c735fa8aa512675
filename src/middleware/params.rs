//! Request Parameters
//!
//! Flattens path variables, query string and JSON body fields into one map
//! that key templates and key functions read from.

use std::collections::HashMap;
use std::fmt;

use axum::extract::{FromRequestParts, Query, RawPathParams};
use axum::http::{request::Parts, Method, Uri};
use serde_json::Value;
use tracing::debug;

// == Param Value ==
/// A loosely-typed parameter value.
///
/// `Absent` is distinct from an empty string: a template placeholder that
/// reads an absent value renders empty, but eviction rules refuse to run on it.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Number(serde_json::Number),
    Absent,
}

static ABSENT: ParamValue = ParamValue::Absent;

impl ParamValue {
    /// Converts a JSON body field.
    ///
    /// `null` is absent, booleans become strings, arrays and objects are kept
    /// as their compact JSON text.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => ParamValue::Absent,
            Value::String(s) => ParamValue::Str(s),
            Value::Number(n) => ParamValue::Number(n),
            Value::Bool(b) => ParamValue::Str(b.to_string()),
            other => ParamValue::Str(other.to_string()),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ParamValue::Absent)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Absent => Ok(()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Number(value.into())
    }
}

// == Request Params ==
/// Parameter name -> value, merged from every request source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    values: HashMap<String, ParamValue>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Value for `name`, `Absent` when the request did not carry it.
    pub fn get(&self, name: &str) -> &ParamValue {
        self.values.get(name).unwrap_or(&ABSENT)
    }

    /// True when `name` is present with a non-absent value.
    pub fn contains(&self, name: &str) -> bool {
        !self.get(name).is_absent()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    // == Collect ==
    /// Builds the map from already-extracted request pieces.
    ///
    /// Merge order is path variables, then the query string for read-style
    /// methods, then JSON body fields for body-bearing methods. Later sources
    /// overwrite earlier ones.
    pub fn collect<'a>(
        method: &Method,
        uri: &Uri,
        path: impl IntoIterator<Item = (&'a str, &'a str)>,
        body: &[u8],
    ) -> Self {
        let mut params = Self::new();

        for (name, value) in path {
            params.insert(name, value);
        }

        if is_read_method(method) {
            params.merge_query(uri);
        } else if is_body_method(method) {
            params.merge_json_body(body);
        }

        params
    }

    /// Builds the map for a request whose body has already been buffered.
    pub async fn from_parts(parts: &mut Parts, body: &[u8]) -> Self {
        let path = RawPathParams::from_request_parts(parts, &()).await.ok();
        let path_pairs = path.iter().flat_map(|raw| raw.iter());

        Self::collect(&parts.method, &parts.uri, path_pairs, body)
    }

    fn merge_query(&mut self, uri: &Uri) {
        let pairs = match Query::<Vec<(String, String)>>::try_from_uri(uri) {
            Ok(Query(pairs)) => pairs,
            Err(e) => {
                debug!(error = %e, "Ignoring unparseable query string");
                return;
            }
        };

        // Repeated keys are joined with commas.
        let mut joined: HashMap<String, String> = HashMap::new();
        for (name, value) in pairs {
            joined
                .entry(name)
                .and_modify(|existing| {
                    existing.push(',');
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        for (name, value) in joined {
            self.insert(name, value);
        }
    }

    fn merge_json_body(&mut self, body: &[u8]) {
        if body.is_empty() {
            return;
        }

        match serde_json::from_slice::<serde_json::Map<String, Value>>(body) {
            Ok(fields) => {
                for (name, value) in fields {
                    self.insert(name, ParamValue::from_json(value));
                }
            }
            Err(e) => debug!(error = %e, "Ignoring non-object JSON body"),
        }
    }
}

/// GET and HEAD read parameters from the query string only.
pub fn is_read_method(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

/// Methods whose JSON body contributes parameters.
pub fn is_body_method(method: &Method) -> bool {
    method == Method::POST
        || method == Method::PUT
        || method == Method::PATCH
        || method == Method::DELETE
}
