//! Storage key naming.
//!
//! Every key kind has a fixed number of `:`-separated components after the
//! prefix:
//!
//! ```text
//! {prefix}{object}:indexes               registry    (2)
//! {prefix}obj:{object}:markers           markers     (3)
//! {prefix}obj:{object}:index:{index}     index       (4)
//! ```
//!
//! Components are escaped (`%` → `%25`, `:` → `%3A`) so a caller-supplied id
//! can never add components of its own. Plain ids render unescaped.

use std::borrow::Cow;

/// Builds storage keys and marker field names under a fixed prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamer {
    prefix: String,
}

impl KeyNamer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Sorted-set key holding the entries of one index.
    pub fn index_key(&self, object_id: &str, index: &str) -> String {
        format!(
            "{}obj:{}:index:{}",
            self.prefix,
            escape(object_id),
            escape(index)
        )
    }

    /// Set key holding the names of every live index of an object.
    pub fn registry_key(&self, object_id: &str) -> String {
        format!("{}{}:indexes", self.prefix, escape(object_id))
    }

    /// Hash key holding every marker of an object.
    pub fn markers_key(&self, object_id: &str) -> String {
        format!("{}obj:{}:markers", self.prefix, escape(object_id))
    }

    /// Field inside the markers hash for one named marker of one index.
    pub fn marker_field(&self, index: &str, marker: &str) -> String {
        format!("{}{}", self.marker_field_prefix(index), escape(marker))
    }

    /// Shared prefix of every marker field belonging to `index`.
    pub fn marker_field_prefix(&self, index: &str) -> String {
        format!("index:{}:name:", escape(index))
    }
}

fn escape(component: &str) -> Cow<'_, str> {
    if !component.contains([':', '%']) {
        return Cow::Borrowed(component);
    }
    let mut out = String::with_capacity(component.len() + 8);
    for c in component.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
