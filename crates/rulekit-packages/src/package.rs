//! The package contract.
//!
//! A package is a named provider of context categories, optionally
//! depending on other packages and optionally contributing condition/action
//! handlers. The registry only merges a package's fragment (and exposes its
//! rules) when the package and its whole dependency closure are available.

use std::fmt;

use rulekit_core::context::{Context, Fragment};
use rulekit_core::errors::{HandlerKind, Result};
use rulekit_engine::registry::HandlerRegistry;
use serde_json::Value;

type LazyBuilder = Box<dyn Fn() -> Value>;

/// Categories contributed by one package for one access cycle.
///
/// Eager categories are deep-merged into the context; lazy categories are
/// built on first access and replace anything merged before them.
#[derive(Default)]
pub struct ContextFragment {
    eager: Fragment,
    lazy: Vec<(String, LazyBuilder)>,
}

impl ContextFragment {
    /// An empty fragment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an eager category.
    #[must_use]
    pub fn with(mut self, category: impl Into<String>, value: Value) -> Self {
        self.insert(category, value);
        self
    }

    /// Add a lazy category.
    #[must_use]
    pub fn with_lazy(mut self, category: impl Into<String>, builder: impl Fn() -> Value + 'static) -> Self {
        self.insert_lazy(category, builder);
        self
    }

    /// Add an eager category, replacing one of the same name.
    pub fn insert(&mut self, category: impl Into<String>, value: Value) {
        let _ = self.eager.insert(category.into(), value);
    }

    /// Add a lazy category.
    pub fn insert_lazy(&mut self, category: impl Into<String>, builder: impl Fn() -> Value + 'static) {
        self.lazy.push((category.into(), Box::new(builder)));
    }

    /// Category names, eager first.
    pub fn categories(&self) -> Vec<&str> {
        self.eager
            .keys()
            .map(String::as_str)
            .chain(self.lazy.iter().map(|(name, _)| name.as_str()))
            .collect()
    }

    /// Whether the fragment contributes nothing.
    pub fn is_empty(&self) -> bool {
        self.eager.is_empty() && self.lazy.is_empty()
    }

    /// Merge into a context.
    pub fn apply(self, context: &mut Context) {
        context.merge_fragment(self.eager);
        for (category, builder) in self.lazy {
            context.insert_lazy(category, builder);
        }
    }
}

impl From<Fragment> for ContextFragment {
    fn from(eager: Fragment) -> Self {
        Self {
            eager,
            lazy: Vec::new(),
        }
    }
}

impl fmt::Debug for ContextFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextFragment")
            .field("eager", &self.eager.keys().collect::<Vec<_>>())
            .field("lazy", &self.lazy.iter().map(|(name, _)| name).collect::<Vec<_>>())
            .finish()
    }
}

/// A named context provider.
///
/// Each provides:
/// - **Identity** via [`name()`](Package::name) and the capability
///   [`namespaces()`](Package::namespaces) it serves
/// - **Availability** via [`is_available()`](Package::is_available) and
///   [`required_packages()`](Package::required_packages)
/// - **Data** via [`build_context_fragment()`](Package::build_context_fragment),
///   called once per access cycle
pub trait Package {
    /// Unique package name.
    fn name(&self) -> &str;

    /// Capability namespaces this package serves.
    fn namespaces(&self) -> Vec<String> {
        Vec::new()
    }

    /// Names of packages that must be available for this one to be.
    fn required_packages(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether the package can serve the current process.
    fn is_available(&self) -> bool {
        true
    }

    /// Build this package's categories for one access cycle.
    fn build_context_fragment(&self) -> Result<ContextFragment>;

    /// Map a condition/action type onto a registered handler type.
    fn resolve_handler_name(&self, _kind: HandlerKind, _handler_type: &str) -> Option<String> {
        None
    }

    /// Register this package's condition/action handlers.
    fn register_handlers(&self, _handlers: &mut HandlerRegistry) {}
}

/// A package serving a fixed set of categories.
///
/// Covers hosts whose data is already materialized (CLI input, tests,
/// configuration-provided state).
#[derive(Debug, Clone)]
pub struct StaticPackage {
    name: String,
    namespaces: Vec<String>,
    requires: Vec<String>,
    available: bool,
    categories: Fragment,
}

impl StaticPackage {
    /// A package named `name` with no categories.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespaces: Vec::new(),
            requires: Vec::new(),
            available: true,
            categories: Fragment::new(),
        }
    }

    /// Add a category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>, value: Value) -> Self {
        let _ = self.categories.insert(category.into(), value);
        self
    }

    /// Add every top-level key of a JSON object as a category.
    #[must_use]
    pub fn with_categories(mut self, value: Value) -> Self {
        if let Value::Object(map) = value {
            self.categories.extend(map);
        }
        self
    }

    /// Declare a dependency.
    #[must_use]
    pub fn requires(mut self, package: impl Into<String>) -> Self {
        self.requires.push(package.into());
        self
    }

    /// Declare a capability namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespaces.push(namespace.into());
        self
    }

    /// Set the availability predicate's answer.
    #[must_use]
    pub fn available(mut self, available: bool) -> Self {
        self.available = available;
        self
    }
}

impl Package for StaticPackage {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespaces(&self) -> Vec<String> {
        self.namespaces.clone()
    }

    fn required_packages(&self) -> Vec<String> {
        self.requires.clone()
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn build_context_fragment(&self) -> Result<ContextFragment> {
        Ok(ContextFragment::from(self.categories.clone()))
    }
}
