//! Placeholder substitution for fixture documents.
//!
//! String leaves may contain `{{request.<dotted.path>}}` placeholders that
//! are filled from request data. There are no helpers, conditionals, or
//! loops; a placeholder that cannot be resolved is left as written.

use regex::{Captures, Regex};
use serde_json::Value;

const PLACEHOLDER_PATTERN: &str = r"\{\{request\.([A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]+)*)\}\}";

/// Template engine for rendering fixture documents.
pub struct TemplateEngine {
    placeholder: Regex,
}

impl TemplateEngine {
    /// Create a new template engine.
    pub fn new() -> Self {
        Self {
            placeholder: Regex::new(PLACEHOLDER_PATTERN).expect("placeholder pattern is valid"),
        }
    }

    /// Render a JSON value with placeholders in string fields.
    ///
    /// Always returns a fresh value; `doc` is never modified.
    pub fn apply(&self, doc: &Value, request: &Value) -> Value {
        match doc {
            Value::String(s) => Value::String(self.render_str(s, request)),
            Value::Array(arr) => Value::Array(arr.iter().map(|v| self.apply(v, request)).collect()),
            Value::Object(obj) => {
                let mut rendered = serde_json::Map::with_capacity(obj.len());
                for (k, v) in obj {
                    rendered.insert(k.clone(), self.apply(v, request));
                }
                Value::Object(rendered)
            }
            _ => doc.clone(),
        }
    }

    /// Substitute every placeholder in a single string, left to right.
    pub fn render_str(&self, template: &str, request: &Value) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }
        self.placeholder
            .replace_all(template, |caps: &Captures| {
                match lookup(request, &caps[1]).and_then(display) {
                    Some(text) => text,
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk a dotted path through objects (and arrays, for numeric segments).
fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Text substituted for a resolved value; `None` for null.
fn display(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok(),
    }
}
