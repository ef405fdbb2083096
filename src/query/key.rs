//! Query keys.
//!
//! A key names a procedure plus its (optional) JSON input. Two keys are equal
//! when their canonical forms are equal; object fields are sorted before the
//! canonical form is produced, so `{"a":1,"b":2}` and `{"b":2,"a":1}` index the
//! same cache entry.

use std::fmt;

use serde_json::Value;

/// Identifies one logical data set in the query cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    path: String,
    input: Option<String>,
}

impl QueryKey {
    /// Key for a procedure called without input.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            input: None,
        }
    }

    /// Key for a procedure called with `input`. A `null` input is treated as absent.
    pub fn with_input(path: impl Into<String>, input: &Value) -> Self {
        let input = match input {
            Value::Null => None,
            v => Some(canonical_json(v)),
        };
        Self {
            path: path.into(),
            input,
        }
    }

    /// Dotted procedure path, e.g. `posts.list`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Canonical JSON of the input, if any.
    pub fn input(&self) -> Option<&str> {
        self.input.as_deref()
    }

    /// Whether this key belongs to `prefix` on a dotted-segment boundary.
    ///
    /// `posts` matches `posts.list` and `posts`, but not `postsArchive.list`.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        match self.path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.input {
            Some(input) => write!(f, "{}?{}", self.path, input),
            None => write!(f, "{}", self.path),
        }
    }
}

fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
