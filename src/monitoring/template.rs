//! `{{ path }}` substitution for webhook body templates.
//!
//! No escaping, loops or conditionals. Unresolvable paths render empty.
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{([^}]+)\}\}").expect("template token pattern is valid")
});

/// Replaces every `{{ a.b.c }}` token with the value found at that dotted path in `context`.
pub fn render(template: &str, context: &Value) -> String {
    TOKEN
        .replace_all(template, |caps: &Captures| {
            lookup(context, caps[1].trim())
                .map(value_to_string)
                .unwrap_or_default()
        })
        .into_owned()
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
