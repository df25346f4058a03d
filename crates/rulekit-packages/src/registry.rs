//! Package registry.
//!
//! Holds packages in registration order, resolves which of them are
//! available, and composes the evaluation [`Context`] from the available
//! ones. Fragments merge in dependency order: a package is merged after
//! everything it requires, so dependents override their dependencies on
//! conflicting keys. Independent packages merge in registration order.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use rulekit_core::context::Context;
use rulekit_core::errors::{HandlerKind, Result, RuleError};
use rulekit_engine::isolate::isolate;
use rulekit_engine::registry::HandlerRegistry;
use rulekit_engine::types::Rule;
use tracing::{debug, warn};

use crate::package::Package;

struct Entry {
    package: Rc<dyn Package>,
    rules: Vec<Rule>,
}

/// Result of one availability pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Availability {
    /// Available package names, dependencies before dependents.
    pub available: Vec<String>,
    /// Unavailable package names with the reason, in registration order.
    pub unavailable: Vec<(String, String)>,
}

impl Availability {
    /// Whether `name` is in the available set.
    pub fn is_available(&self, name: &str) -> bool {
        self.available.iter().any(|n| n == name)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done(bool),
}

/// Registry of packages and the rules they own.
#[derive(Default)]
pub struct PackageRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl PackageRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package.
    ///
    /// A package with the same name is replaced in its original slot; rules
    /// already stored under that name are kept.
    pub fn register(&mut self, package: impl Package + 'static) {
        self.register_rc(Rc::new(package));
    }

    /// Register a shared package instance.
    pub fn register_rc(&mut self, package: Rc<dyn Package>) {
        let name = package.name().to_string();
        if let Some(&slot) = self.index.get(&name) {
            debug!(package = %name, "replacing registered package");
            self.entries[slot].package = package;
            return;
        }
        debug!(package = %name, "registering package");
        let _ = self.index.insert(name, self.entries.len());
        self.entries.push(Entry {
            package,
            rules: Vec::new(),
        });
    }

    /// Look up a package by name.
    pub fn get(&self, name: &str) -> Option<Rc<dyn Package>> {
        self.index.get(name).map(|&slot| Rc::clone(&self.entries[slot].package))
    }

    /// Whether a package is registered (available or not).
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered package names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.package.name()).collect()
    }

    /// Number of registered packages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no package is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store rules under a registered package. Every rule is validated
    /// before any is stored.
    pub fn register_rules(&mut self, package: &str, rules: impl IntoIterator<Item = Rule>) -> Result<()> {
        let slot = *self.index.get(package).ok_or_else(|| RuleError::PackageUnavailable {
            name: package.to_string(),
            reason: "not registered".to_string(),
        })?;
        let rules: Vec<Rule> = rules.into_iter().collect();
        for rule in &rules {
            rule.validate()?;
        }
        debug!(package, count = rules.len(), "storing package rules");
        self.entries[slot].rules.extend(rules);
        Ok(())
    }

    /// Rules stored under one package, regardless of availability.
    pub fn rules_for(&self, package: &str) -> &[Rule] {
        match self.index.get(package) {
            Some(&slot) => &self.entries[slot].rules,
            None => &[],
        }
    }

    /// Rules of every available package, dependencies first, each package's
    /// rules in registration order.
    pub fn rules(&self) -> Vec<Rule> {
        self.availability()
            .available
            .iter()
            .flat_map(|name| self.rules_for(name).iter().cloned())
            .collect()
    }

    /// Drop every package's stored rules. Packages stay registered.
    pub fn clear_rules(&mut self) {
        for entry in &mut self.entries {
            entry.rules.clear();
        }
    }

    /// Remove every package and its rules.
    pub fn reset(&mut self) {
        debug!(count = self.entries.len(), "resetting package registry");
        self.entries.clear();
        self.index.clear();
    }

    /// Compute which packages are available.
    ///
    /// A package is available when its predicate is true and every package
    /// it requires is registered, available, and not part of a dependency
    /// cycle. Each predicate runs at most once per pass.
    pub fn availability(&self) -> Availability {
        let mut visits: Vec<Option<Visit>> = vec![None; self.entries.len()];
        let mut result = Availability::default();
        let mut reasons: Vec<Option<String>> = vec![None; self.entries.len()];
        for slot in 0..self.entries.len() {
            let _ = self.visit(slot, &mut visits, &mut reasons, &mut result.available);
        }
        result.unavailable = self
            .entries
            .iter()
            .zip(reasons)
            .filter_map(|(entry, reason)| reason.map(|r| (entry.package.name().to_string(), r)))
            .collect();
        result
    }

    fn visit(
        &self,
        slot: usize,
        visits: &mut [Option<Visit>],
        reasons: &mut [Option<String>],
        order: &mut Vec<String>,
    ) -> bool {
        match visits[slot] {
            Some(Visit::Done(available)) => return available,
            Some(Visit::InProgress) => return false,
            None => {}
        }
        visits[slot] = Some(Visit::InProgress);

        let package = &self.entries[slot].package;
        let reason = if package.is_available() {
            self.first_unmet_dependency(package.as_ref(), visits, reasons, order)
        } else {
            Some("availability predicate returned false".to_string())
        };

        let available = reason.is_none();
        if let Some(reason) = reason {
            warn!(package = %package.name(), %reason, "package unavailable");
            reasons[slot] = Some(reason);
        } else {
            order.push(package.name().to_string());
        }
        visits[slot] = Some(Visit::Done(available));
        available
    }

    fn first_unmet_dependency(
        &self,
        package: &dyn Package,
        visits: &mut [Option<Visit>],
        reasons: &mut [Option<String>],
        order: &mut Vec<String>,
    ) -> Option<String> {
        for dependency in package.required_packages() {
            let Some(&dep_slot) = self.index.get(&dependency) else {
                return Some(format!("required package '{dependency}' is not registered"));
            };
            if visits[dep_slot] == Some(Visit::InProgress) {
                return Some(format!("dependency cycle through '{dependency}'"));
            }
            if !self.visit(dep_slot, visits, reasons, order) {
                return Some(format!("required package '{dependency}' is unavailable"));
            }
        }
        None
    }

    /// Whether a package and its dependency closure are available.
    pub fn is_available(&self, name: &str) -> bool {
        self.availability().is_available(name)
    }

    /// Build the context from every available package.
    ///
    /// A package whose fragment builder fails or panics is skipped; the
    /// packages that depend on it are still merged.
    pub fn build_context(&self) -> Context {
        let mut context = Context::new();
        for name in self.availability().available {
            let Some(package) = self.get(&name) else {
                continue;
            };
            match isolate(&name, || package.build_context_fragment()) {
                Ok(fragment) => {
                    debug!(package = %name, categories = ?fragment.categories(), "merging package fragment");
                    fragment.apply(&mut context);
                }
                Err(error) => {
                    warn!(package = %name, %error, "package fragment failed, skipping");
                }
            }
        }
        context
    }

    /// Let every available package register its handlers and type-name
    /// resolvers.
    pub fn install_handlers(&self, handlers: &mut HandlerRegistry) {
        for name in self.availability().available {
            let Some(package) = self.get(&name) else {
                continue;
            };
            package.register_handlers(handlers);
            let resolver = Rc::clone(&package);
            handlers.add_name_resolver(move |kind: HandlerKind, handler_type: &str| {
                resolver.resolve_handler_name(kind, handler_type)
            });
        }
    }
}

impl fmt::Debug for PackageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageRegistry")
            .field("packages", &self.names())
            .field("rules", &self.entries.iter().map(|e| e.rules.len()).sum::<usize>())
            .finish()
    }
}
