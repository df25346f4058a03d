//! Placeholder resolution.
//!
//! String fields of conditions and actions may embed tokens of the form
//! `{category:segment[:segment...]}`. At evaluation time each token is
//! replaced by a scalar from the [`Context`]:
//!
//! 1. If a resolver is registered for `category`, it is called with the
//!    context and the segment list.
//! 2. Otherwise the segments are walked inside `context[category]`.
//!
//! Only scalar leaves substitute. Mappings, lists, null, and missing values
//! all substitute as the empty string; resolution never fails. Braced text
//! without a `:` (`{2}`, `{name}`) is not a token and is left untouched, so
//! regex quantifiers and JSON snippets survive resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::trace;

use crate::context::Context;
use crate::value::{cast_string, is_scalar};

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z0-9_-]+)((?::[^:{}]+)+)\}").expect("placeholder pattern is valid")
});

/// A parsed `{category:segment:...}` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderToken {
    /// Top-level context category.
    pub category: String,
    /// Ordered path segments inside the category.
    pub segments: Vec<String>,
}

impl PlaceholderToken {
    /// Parse a single token, with or without the surrounding braces.
    ///
    /// Returns `None` when the text is not exactly one token.
    pub fn parse(raw: &str) -> Option<Self> {
        let braced;
        let candidate = if raw.starts_with('{') {
            raw
        } else {
            braced = format!("{{{raw}}}");
            braced.as_str()
        };
        let caps = TOKEN_RE.captures(candidate)?;
        if caps.get(0)?.as_str().len() != candidate.len() {
            return None;
        }
        Some(Self::from_captures(&caps))
    }

    fn from_captures(caps: &Captures<'_>) -> Self {
        Self {
            category: caps[1].to_string(),
            segments: caps[2][1..].split(':').map(ToString::to_string).collect(),
        }
    }
}

impl fmt::Display for PlaceholderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}:{}}}", self.category, self.segments.join(":"))
    }
}

/// Find every token in a string, in order of appearance.
pub fn find_tokens(raw: &str) -> Vec<PlaceholderToken> {
    TOKEN_RE
        .captures_iter(raw)
        .map(|caps| PlaceholderToken::from_captures(&caps))
        .collect()
}

/// Whether a string contains at least one token.
pub fn contains_placeholders(raw: &str) -> bool {
    raw.contains('{') && TOKEN_RE.is_match(raw)
}

type CategoryResolver = Box<dyn Fn(&Context, &[String]) -> Option<Value>>;

/// Resolves placeholder tokens against a [`Context`].
///
/// Holds the per-category resolver table. Resolution itself is stateless:
/// nothing is cached between calls.
#[derive(Default)]
pub struct PlaceholderResolver {
    resolvers: HashMap<String, CategoryResolver>,
}

impl PlaceholderResolver {
    /// Create a resolver with no custom categories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom resolver for a category, replacing any existing one.
    pub fn register(
        &mut self,
        category: impl Into<String>,
        resolver: impl Fn(&Context, &[String]) -> Option<Value> + 'static,
    ) {
        let category = category.into();
        trace!(category = %category, "registering placeholder category");
        let _ = self.resolvers.insert(category, Box::new(resolver));
    }

    /// Register a category whose lookups ignore key case.
    ///
    /// `{header:content-type}` then resolves `context["header"]["Content-Type"]`.
    pub fn register_case_insensitive(&mut self, category: impl Into<String>) {
        let category = category.into();
        let source = category.clone();
        self.register(category, move |ctx, segments| {
            ctx.lookup_case_insensitive(&source, segments).cloned()
        });
    }

    /// Remove a custom resolver. Returns `true` if one was registered.
    pub fn unregister(&mut self, category: &str) -> bool {
        self.resolvers.remove(category).is_some()
    }

    /// Whether a custom resolver is registered for the category.
    pub fn has_resolver(&self, category: &str) -> bool {
        self.resolvers.contains_key(category)
    }

    /// Look up the raw value a token points at.
    pub fn lookup(&self, token: &PlaceholderToken, ctx: &Context) -> Option<Value> {
        match self.resolvers.get(&token.category) {
            Some(resolver) => resolver(ctx, &token.segments),
            None => ctx.lookup(&token.category, &token.segments).cloned(),
        }
    }

    /// Resolve a single token to its substitution text.
    ///
    /// Unresolved and non-scalar values yield `""`.
    pub fn resolve_token(&self, token: &PlaceholderToken, ctx: &Context) -> String {
        match self.lookup(token, ctx) {
            Some(value) if is_scalar(&value) => cast_string(&value),
            Some(_) | None => {
                trace!(token = %token, "placeholder unresolved, substituting empty string");
                String::new()
            }
        }
    }

    /// Substitute every token in `raw`.
    ///
    /// Strings without tokens come back unchanged.
    pub fn resolve(&self, raw: &str, ctx: &Context) -> String {
        if !raw.contains('{') {
            return raw.to_string();
        }
        TOKEN_RE
            .replace_all(raw, |caps: &Captures<'_>| {
                self.resolve_token(&PlaceholderToken::from_captures(caps), ctx)
            })
            .into_owned()
    }

    /// Resolve a JSON value: strings are substituted, everything else is
    /// returned as is.
    pub fn resolve_value(&self, value: &Value, ctx: &Context) -> Value {
        match value {
            Value::String(s) => Value::String(self.resolve(s, ctx)),
            other => other.clone(),
        }
    }
}

impl fmt::Debug for PlaceholderResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut categories: Vec<&String> = self.resolvers.keys().collect();
        categories.sort();
        f.debug_struct("PlaceholderResolver")
            .field("categories", &categories)
            .finish()
    }
}
