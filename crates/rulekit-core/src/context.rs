//! The evaluation context.
//!
//! A [`Context`] maps top-level category names (`request`, `cookie`, `user`,
//! `hook`, ...) to JSON fragments of arbitrary depth. Categories are either
//! eager values or lazy builders that run on first access, at most once per
//! context instance.
//!
//! Merge rules (shared with the settings loader):
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A package-contributed set of categories.
pub type Fragment = Map<String, Value>;

type LazyBuilder = Box<dyn Fn() -> Value>;

struct LazyCategory {
    builder: LazyBuilder,
    cell: OnceCell<Value>,
}

impl LazyCategory {
    fn value(&self) -> &Value {
        self.cell.get_or_init(|| (self.builder)())
    }
}

/// Merged, queryable data tree for one evaluation pass.
///
/// Contexts are built per access cycle (one per incoming event) and are not
/// shared across threads.
#[derive(Default)]
pub struct Context {
    categories: Map<String, Value>,
    lazy: HashMap<String, LazyCategory>,
}

impl Context {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object, one category per top-level key.
    ///
    /// Non-object input yields an empty context.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(categories) => Self {
                categories,
                lazy: HashMap::new(),
            },
            other => {
                warn!(kind = value_kind(&other), "context root is not an object, ignoring");
                Self::default()
            }
        }
    }

    /// Set a category, replacing any eager or lazy value under that name.
    pub fn insert(&mut self, category: impl Into<String>, value: Value) {
        let category = category.into();
        let _ = self.lazy.remove(&category);
        let _ = self.categories.insert(category, value);
    }

    /// Register a category whose value is built on first access.
    ///
    /// Replaces any eager or lazy value under that name.
    pub fn insert_lazy(&mut self, category: impl Into<String>, builder: impl Fn() -> Value + 'static) {
        let category = category.into();
        let _ = self.categories.remove(&category);
        let _ = self.lazy.insert(
            category,
            LazyCategory {
                builder: Box::new(builder),
                cell: OnceCell::new(),
            },
        );
    }

    /// Deep-merge a value into a category.
    ///
    /// A lazy category under the same name is dropped: the merged value
    /// replaces it outright.
    pub fn merge(&mut self, category: impl Into<String>, value: Value) {
        let category = category.into();
        if self.lazy.remove(&category).is_some() {
            debug!(category = %category, "eager fragment replaces lazy category");
        }
        let merged = match self.categories.remove(&category) {
            Some(existing) => deep_merge(existing, value),
            None => value,
        };
        let _ = self.categories.insert(category, merged);
    }

    /// Deep-merge every category of a fragment.
    pub fn merge_fragment(&mut self, fragment: Fragment) {
        for (category, value) in fragment {
            self.merge(category, value);
        }
    }

    /// Get a category, forcing it if lazy.
    pub fn get(&self, category: &str) -> Option<&Value> {
        self.categories
            .get(category)
            .or_else(|| self.lazy.get(category).map(LazyCategory::value))
    }

    /// Whether a category is present (eager or lazy).
    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains_key(category) || self.lazy.contains_key(category)
    }

    /// Whether a lazy category has already been built.
    pub fn is_forced(&self, category: &str) -> bool {
        self.lazy
            .get(category)
            .is_some_and(|lazy| lazy.cell.get().is_some())
    }

    /// Nested lookup of `segments` inside a category.
    ///
    /// Every intermediate level must be a mapping; a missing key or a
    /// non-mapping level fails the lookup. No segments returns the category.
    pub fn lookup<S: AsRef<str>>(&self, category: &str, segments: &[S]) -> Option<&Value> {
        walk(self.get(category)?, segments, false)
    }

    /// Like [`lookup`](Self::lookup), ignoring key case at every level.
    ///
    /// An exact key match wins over a case-folded one.
    pub fn lookup_case_insensitive<S: AsRef<str>>(
        &self,
        category: &str,
        segments: &[S],
    ) -> Option<&Value> {
        walk(self.get(category)?, segments, true)
    }

    /// Category names, sorted.
    pub fn categories(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .categories
            .keys()
            .chain(self.lazy.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names
    }

    /// Snapshot the whole tree as JSON, forcing lazy categories.
    pub fn to_value(&self) -> Value {
        let mut out = self.categories.clone();
        for (name, lazy) in &self.lazy {
            let _ = out.insert(name.clone(), lazy.value().clone());
        }
        Value::Object(out)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("categories", &self.categories.keys().collect::<Vec<_>>())
            .field("lazy", &self.lazy.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl From<Value> for Context {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

fn walk<'a, S: AsRef<str>>(mut node: &'a Value, segments: &[S], case_insensitive: bool) -> Option<&'a Value> {
    for segment in segments {
        let segment = segment.as_ref();
        let Value::Object(map) = node else {
            return None;
        };
        node = match map.get(segment) {
            Some(next) => next,
            None if case_insensitive => {
                let folded = segment.to_lowercase();
                map.iter()
                    .find(|(key, _)| key.to_lowercase() == folded)
                    .map(|(_, value)| value)?
            }
            None => return None,
        };
    }
    Some(node)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use serde_json::json;

    fn request_context() -> Context {
        Context::from_value(json!({
            "request": {
                "method": "POST",
                "headers": {"Content-Type": "text/html", "X-Trace": "t1"},
                "query": {"page": "2"}
            },
            "cookie": {"session_id": "abc"}
        }))
    }

    #[test]
    fn from_value_object() {
        let ctx = request_context();
        assert_eq!(ctx.categories(), vec!["cookie", "request"]);
        assert_eq!(ctx.get("cookie").unwrap()["session_id"], "abc");
    }

    #[test]
    fn from_value_non_object_is_empty() {
        let ctx = Context::from_value(json!([1, 2, 3]));
        assert!(ctx.categories().is_empty());
    }

    #[test]
    fn nested_lookup() {
        let ctx = request_context();
        assert_eq!(ctx.lookup("request", &["method"]), Some(&json!("POST")));
        assert_eq!(ctx.lookup("request", &["query", "page"]), Some(&json!("2")));
        assert_eq!(ctx.lookup("request", &["query", "missing"]), None);
        assert_eq!(ctx.lookup("nope", &["x"]), None);
    }

    #[test]
    fn lookup_through_scalar_fails() {
        let ctx = request_context();
        assert_eq!(ctx.lookup("request", &["method", "deeper"]), None);
    }

    #[test]
    fn lookup_empty_segments_returns_category() {
        let ctx = request_context();
        let segments: [&str; 0] = [];
        assert!(ctx.lookup("cookie", &segments).unwrap().is_object());
    }

    #[test]
    fn case_insensitive_lookup() {
        let ctx = request_context();
        let expected = json!("text/html");
        assert_eq!(ctx.lookup("request", &["headers", "content-type"]), None);
        assert_eq!(
            ctx.lookup_case_insensitive("request", &["HEADERS", "content-type"]),
            Some(&expected)
        );
        assert_eq!(
            ctx.lookup_case_insensitive("request", &["headers", "CONTENT-TYPE"]),
            Some(&expected)
        );
    }

    #[test]
    fn lazy_category_built_once_on_first_access() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut ctx = Context::new();
        ctx.insert_lazy("user", move || {
            counter.set(counter.get() + 1);
            json!({"id": 7})
        });

        assert!(ctx.contains("user"));
        assert!(!ctx.is_forced("user"));
        assert_eq!(calls.get(), 0);

        assert_eq!(ctx.lookup("user", &["id"]), Some(&json!(7)));
        assert_eq!(ctx.lookup("user", &["id"]), Some(&json!(7)));
        assert_eq!(calls.get(), 1);
        assert!(ctx.is_forced("user"));
    }

    #[test]
    fn insert_replaces_lazy() {
        let mut ctx = Context::new();
        ctx.insert_lazy("user", || json!({"id": 1}));
        ctx.insert("user", json!({"id": 2}));
        assert_eq!(ctx.lookup("user", &["id"]), Some(&json!(2)));
        assert_eq!(ctx.categories(), vec!["user"]);
    }

    #[test]
    fn merge_deep_merges_category() {
        let mut ctx = request_context();
        ctx.merge("request", json!({"query": {"sort": "asc"}, "method": "GET"}));
        assert_eq!(ctx.lookup("request", &["method"]), Some(&json!("GET")));
        assert_eq!(ctx.lookup("request", &["query", "page"]), Some(&json!("2")));
        assert_eq!(ctx.lookup("request", &["query", "sort"]), Some(&json!("asc")));
    }

    #[test]
    fn merge_fragment_adds_categories() {
        let mut ctx = Context::new();
        let mut fragment = Fragment::new();
        let _ = fragment.insert("site".into(), json!({"name": "demo"}));
        ctx.merge_fragment(fragment);
        assert_eq!(ctx.lookup("site", &["name"]), Some(&json!("demo")));
    }

    #[test]
    fn to_value_forces_lazy() {
        let mut ctx = Context::new();
        ctx.insert("a", json!(1));
        ctx.insert_lazy("b", || json!(2));
        assert_eq!(ctx.to_value(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn debug_lists_category_names() {
        let ctx = request_context();
        let debug = format!("{ctx:?}");
        assert!(debug.contains("Context"));
        assert!(debug.contains("request"));
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let merged = deep_merge(
            json!({"server": {"port": 8080, "host": "localhost"}}),
            json!({"server": {"port": 9090}}),
        );
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(json!({"items": [1, 2, 3]}), json!({"items": [4]}));
        assert_eq!(merged["items"], json!([4]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(json!({"a": {"nested": true}}), json!({"a": 42}));
        assert_eq!(merged["a"], 42);
    }
}
