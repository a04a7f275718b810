//! Templated query expansion.
//!
//! A template embeds `%{path}` expressions, where `path` is a dotted lookup
//! into a JSON root object. Each expression becomes a `?` placeholder and the
//! looked-up value becomes the matching parameter.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value as JsonValue;

use crate::models::{CompiledQuery, QueryParam};

static EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\{\s*([^}\s]+)\s*\}").expect("Invalid expression regex"));

/// Follow a dotted path through objects and arrays.
pub fn lookup<'v>(root: &'v JsonValue, path: &str) -> Option<&'v JsonValue> {
    path.split('.').try_fold(root, |value, segment| match value {
        JsonValue::Object(map) => map.get(segment),
        JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Expand every `%{path}` in `template` against `root`.
///
/// A path that does not resolve binds NULL.
pub fn expand(template: &str, root: &JsonValue) -> CompiledQuery {
    let mut parameters = Vec::new();
    let query = EXPRESSION.replace_all(template, |caps: &Captures| {
        let value = lookup(root, &caps[1]);
        parameters.push(value.map(QueryParam::from_json).unwrap_or(QueryParam::Null));
        "?"
    });
    CompiledQuery::new(query.into_owned(), parameters)
}
