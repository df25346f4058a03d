//! Handler registry.
//!
//! Maps condition/action type strings to factories. Factories are looked up
//! by exact type first, then through the registered name resolvers, which
//! let packages alias host-specific type names (`wp_request_method`) onto
//! registered handlers.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use rulekit_core::errors::{HandlerKind, Result, RuleError};
use tracing::debug;

use crate::condition::{ContextPath, ContextValueCondition, ValueCondition, ValueExtractor};
use crate::handler::{
    ActionHandler, CallbackAction, CallbackCondition, ConditionHandler, LogAction, Scope,
};
use crate::types::{ActionConfig, ConditionConfig};

/// Builds a condition handler for one config.
pub type ConditionFactory = Rc<dyn Fn(&ConditionConfig, &Scope<'_>) -> Result<Box<dyn ConditionHandler>>>;

/// Builds an action handler for one config.
pub type ActionFactory = Rc<dyn Fn(&ActionConfig, &Scope<'_>) -> Result<Box<dyn ActionHandler>>>;

type NameResolver = Box<dyn Fn(HandlerKind, &str) -> Option<String>>;

/// Registry of condition and action factories.
#[derive(Default)]
pub struct HandlerRegistry {
    conditions: HashMap<String, ConditionFactory>,
    actions: HashMap<String, ActionFactory>,
    name_resolvers: Vec<NameResolver>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `context` condition and `log` action.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_condition(ContextValueCondition::TYPE, |config, _| {
            Ok(Box::new(ContextValueCondition::from_config(config)?))
        });
        registry.register_action(LogAction::TYPE, |config, _| Ok(Box::new(LogAction::from_config(config))));
        registry
    }

    /// Register a condition factory, replacing any existing one.
    pub fn register_condition(
        &mut self,
        condition_type: impl Into<String>,
        factory: impl Fn(&ConditionConfig, &Scope<'_>) -> Result<Box<dyn ConditionHandler>> + 'static,
    ) {
        let condition_type = condition_type.into();
        debug!(condition_type = %condition_type, "registering condition handler");
        let _ = self.conditions.insert(condition_type, Rc::new(factory));
    }

    /// Register an action factory, replacing any existing one.
    pub fn register_action(
        &mut self,
        action_type: impl Into<String>,
        factory: impl Fn(&ActionConfig, &Scope<'_>) -> Result<Box<dyn ActionHandler>> + 'static,
    ) {
        let action_type = action_type.into();
        debug!(action_type = %action_type, "registering action handler");
        let _ = self.actions.insert(action_type, Rc::new(factory));
    }

    /// Register a condition type backed by a closure.
    pub fn register_condition_callback(
        &mut self,
        condition_type: impl Into<String>,
        callback: impl Fn(&ConditionConfig, &Scope<'_>) -> Result<bool> + 'static,
    ) {
        let callback: Rc<dyn Fn(&ConditionConfig, &Scope<'_>) -> Result<bool>> = Rc::new(callback);
        self.register_condition(condition_type, move |config, _| {
            Ok(Box::new(CallbackCondition::new(config.clone(), Rc::clone(&callback))))
        });
    }

    /// Register an action type backed by a closure.
    pub fn register_action_callback(
        &mut self,
        action_type: impl Into<String>,
        callback: impl Fn(&ActionConfig, &Scope<'_>) -> Result<()> + 'static,
    ) {
        let callback: Rc<dyn Fn(&ActionConfig, &Scope<'_>) -> Result<()>> = Rc::new(callback);
        self.register_action(action_type, move |config, _| {
            Ok(Box::new(CallbackAction::new(config.clone(), Rc::clone(&callback))))
        });
    }

    /// Register a condition type that compares a value pulled by `extractor`.
    pub fn register_value_condition(
        &mut self,
        condition_type: impl Into<String>,
        extractor: impl ValueExtractor + 'static,
    ) {
        let extractor: Rc<dyn ValueExtractor> = Rc::new(extractor);
        self.register_condition(condition_type, move |config, _| {
            Ok(Box::new(ValueCondition::new(config.clone(), Rc::clone(&extractor))))
        });
    }

    /// Register a condition type reading a dotted context path.
    pub fn register_path_condition(&mut self, condition_type: impl Into<String>, path: &str) -> Result<()> {
        let path = ContextPath::parse(path)?;
        self.register_value_condition(condition_type, path);
        Ok(())
    }

    /// Add a resolver mapping unknown type names onto registered ones.
    pub fn add_name_resolver(&mut self, resolver: impl Fn(HandlerKind, &str) -> Option<String> + 'static) {
        self.name_resolvers.push(Box::new(resolver));
    }

    /// Resolve a type name to a registered type, if any.
    pub fn resolve_name(&self, kind: HandlerKind, handler_type: &str) -> Option<String> {
        if self.is_registered(kind, handler_type) {
            return Some(handler_type.to_string());
        }
        self.name_resolvers
            .iter()
            .filter_map(|resolve| resolve(kind, handler_type))
            .find(|resolved| self.is_registered(kind, resolved))
    }

    fn is_registered(&self, kind: HandlerKind, handler_type: &str) -> bool {
        match kind {
            HandlerKind::Condition => self.conditions.contains_key(handler_type),
            HandlerKind::Action => self.actions.contains_key(handler_type),
        }
    }

    fn unknown(kind: HandlerKind, handler_type: &str) -> RuleError {
        RuleError::UnknownHandler {
            kind,
            handler_type: handler_type.to_string(),
        }
    }

    /// Build the handler for a condition config.
    pub fn build_condition(&self, config: &ConditionConfig, scope: &Scope<'_>) -> Result<Box<dyn ConditionHandler>> {
        let resolved = self
            .resolve_name(HandlerKind::Condition, &config.condition_type)
            .ok_or_else(|| Self::unknown(HandlerKind::Condition, &config.condition_type))?;
        let factory = self
            .conditions
            .get(&resolved)
            .ok_or_else(|| Self::unknown(HandlerKind::Condition, &resolved))?;
        factory(config, scope)
    }

    /// Build the handler for an action config.
    pub fn build_action(&self, config: &ActionConfig, scope: &Scope<'_>) -> Result<Box<dyn ActionHandler>> {
        let resolved = self
            .resolve_name(HandlerKind::Action, &config.action_type)
            .ok_or_else(|| Self::unknown(HandlerKind::Action, &config.action_type))?;
        let factory = self
            .actions
            .get(&resolved)
            .ok_or_else(|| Self::unknown(HandlerKind::Action, &resolved))?;
        factory(config, scope)
    }

    /// Whether a condition type (or an alias of one) is registered.
    pub fn has_condition(&self, condition_type: &str) -> bool {
        self.resolve_name(HandlerKind::Condition, condition_type).is_some()
    }

    /// Whether an action type (or an alias of one) is registered.
    pub fn has_action(&self, action_type: &str) -> bool {
        self.resolve_name(HandlerKind::Action, action_type).is_some()
    }

    /// Registered condition types, sorted.
    pub fn condition_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.conditions.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Registered action types, sorted.
    pub fn action_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Remove every factory and name resolver.
    pub fn clear(&mut self) {
        self.conditions.clear();
        self.actions.clear();
        self.name_resolvers.clear();
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("conditions", &self.condition_types())
            .field("actions", &self.action_types())
            .field("name_resolvers", &self.name_resolvers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rulekit_core::context::Context;
    use rulekit_core::placeholder::PlaceholderResolver;
    use serde_json::json;

    fn with_scope(f: impl FnOnce(&Scope<'_>)) {
        let ctx = Context::from_value(json!({"request": {"method": "POST"}}));
        let resolver = PlaceholderResolver::new();
        f(&Scope::new(&ctx, &resolver, "r"));
    }

    #[test]
    fn builtins_registered() {
        let registry = HandlerRegistry::with_builtins();
        assert_eq!(registry.condition_types(), vec!["context"]);
        assert_eq!(registry.action_types(), vec!["log"]);
    }

    #[test]
    fn unknown_types_error() {
        let registry = HandlerRegistry::new();
        with_scope(|scope| {
            assert_matches!(
                registry.build_condition(&ConditionConfig::new("nope", "=", "x"), scope),
                Err(RuleError::UnknownHandler { kind: HandlerKind::Condition, .. })
            );
            assert_matches!(
                registry.build_action(&ActionConfig::new("nope"), scope),
                Err(RuleError::UnknownHandler { kind: HandlerKind::Action, .. })
            );
        });
    }

    #[test]
    fn path_condition_builds_and_matches() {
        let mut registry = HandlerRegistry::new();
        registry.register_path_condition("request_method", "request.method").unwrap();
        assert!(registry.register_path_condition("bad", "").is_err());

        with_scope(|scope| {
            let handler = registry
                .build_condition(&ConditionConfig::new("request_method", "=", "POST"), scope)
                .unwrap();
            assert_eq!(handler.handler_type(), "request_method");
            assert!(handler.matches(scope).unwrap());
        });
    }

    #[test]
    fn callbacks_registered() {
        let mut registry = HandlerRegistry::new();
        registry.register_condition_callback("always", |_, _| Ok(true));
        registry.register_action_callback("noop", |_, _| Ok(()));
        assert!(registry.has_condition("always"));
        assert!(registry.has_action("noop"));

        with_scope(|scope| {
            let condition = registry
                .build_condition(&ConditionConfig::new("always", "=", "x"), scope)
                .unwrap();
            assert!(condition.matches(scope).unwrap());
            let action = registry.build_action(&ActionConfig::new("noop"), scope).unwrap();
            assert!(action.execute(scope).is_ok());
        });
    }

    #[test]
    fn name_resolvers_alias_types() {
        let mut registry = HandlerRegistry::new();
        registry.register_path_condition("request_method", "request.method").unwrap();
        registry.add_name_resolver(|kind, name| match kind {
            HandlerKind::Condition => name.strip_prefix("wp_").map(ToString::to_string),
            HandlerKind::Action => None,
        });

        assert_eq!(
            registry.resolve_name(HandlerKind::Condition, "wp_request_method").as_deref(),
            Some("request_method")
        );
        assert_eq!(registry.resolve_name(HandlerKind::Condition, "wp_other"), None);
        assert!(!registry.has_action("wp_request_method"));

        with_scope(|scope| {
            let handler = registry
                .build_condition(&ConditionConfig::new("wp_request_method", "=", "POST"), scope)
                .unwrap();
            assert!(handler.matches(scope).unwrap());
        });
    }

    #[test]
    fn later_registration_replaces() {
        let mut registry = HandlerRegistry::new();
        registry.register_condition_callback("flag", |_, _| Ok(false));
        registry.register_condition_callback("flag", |_, _| Ok(true));
        with_scope(|scope| {
            let handler = registry
                .build_condition(&ConditionConfig::new("flag", "=", "x"), scope)
                .unwrap();
            assert!(handler.matches(scope).unwrap());
        });
    }

    #[test]
    fn clear_empties_everything() {
        let mut registry = HandlerRegistry::with_builtins();
        registry.add_name_resolver(|_, _| None);
        registry.clear();
        assert!(registry.condition_types().is_empty());
        assert!(registry.action_types().is_empty());
        assert!(format!("{registry:?}").contains("name_resolvers: 0"));
    }
}
