//! Rule execution.
//!
//! [`RuleEngine::execute`] takes enabled rules, stable-sorts them by
//! `order`, evaluates each rule's conditions under its match type, and
//! dispatches actions for every rule that matches. It never fails: a rule
//! with a broken condition does not match under any match type, and broken
//! actions are skipped, both with a `warn!` event.

use rulekit_core::context::Context;
use rulekit_core::errors::HandlerKind;
use rulekit_core::placeholder::PlaceholderResolver;
use serde::Serialize;
use tracing::debug;

use crate::dispatcher::{ActionDispatcher, DispatchReport};
use crate::handler::Scope;
use crate::isolate::isolate_or;
use crate::registry::HandlerRegistry;
use crate::types::{ConditionConfig, Rule};

/// Outcome of one [`RuleEngine::execute`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    /// Enabled rules that were evaluated.
    pub evaluated: usize,
    /// Ids of matching rules, in execution order.
    pub matched: Vec<String>,
    /// Combined action outcome over all matching rules.
    pub actions: DispatchReport,
}

impl ExecutionReport {
    /// Whether the rule with this id matched.
    pub fn is_matched(&self, rule_id: &str) -> bool {
        self.matched.iter().any(|id| id == rule_id)
    }
}

/// Evaluates rules against a context.
#[derive(Debug, Default)]
pub struct RuleEngine {
    handlers: HandlerRegistry,
    placeholders: PlaceholderResolver,
}

impl RuleEngine {
    /// Create an engine from a handler registry and placeholder resolver.
    pub fn new(handlers: HandlerRegistry, placeholders: PlaceholderResolver) -> Self {
        Self {
            handlers,
            placeholders,
        }
    }

    /// Engine with the built-in handlers and default placeholder resolution.
    #[must_use]
    pub fn with_builtins() -> Self {
        Self::new(HandlerRegistry::with_builtins(), PlaceholderResolver::new())
    }

    /// The handler registry.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Mutable access to the handler registry.
    pub fn handlers_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.handlers
    }

    /// The placeholder resolver.
    pub fn placeholders(&self) -> &PlaceholderResolver {
        &self.placeholders
    }

    /// Mutable access to the placeholder resolver.
    pub fn placeholders_mut(&mut self) -> &mut PlaceholderResolver {
        &mut self.placeholders
    }

    /// Evaluate `rules` against `context` and run actions of matching rules.
    pub fn execute(&self, rules: &[Rule], context: &Context) -> ExecutionReport {
        let mut ordered: Vec<&Rule> = rules.iter().filter(|rule| rule.enabled).collect();
        ordered.sort_by_key(|rule| rule.order);

        let mut report = ExecutionReport::default();
        let dispatcher = ActionDispatcher::new(&self.handlers);

        for rule in ordered {
            report.evaluated += 1;
            let scope = Scope::new(context, &self.placeholders, &rule.id);
            if !self.rule_matches(rule, &scope) {
                debug!(rule_id = %rule.id, "rule did not match");
                continue;
            }
            debug!(rule_id = %rule.id, actions = rule.actions.len(), "rule matched");
            report.matched.push(rule.id.clone());
            report.actions.absorb(dispatcher.run(&rule.actions, &scope));
        }

        report
    }

    /// Evaluate a single rule's conditions without running its actions.
    ///
    /// Disabled rules never match.
    pub fn evaluate_rule(&self, rule: &Rule, context: &Context) -> bool {
        rule.enabled && self.rule_matches(rule, &Scope::new(context, &self.placeholders, &rule.id))
    }

    /// A failed condition ends evaluation and the rule does not match, so
    /// `none` never turns a broken condition into a match.
    fn rule_matches(&self, rule: &Rule, scope: &Scope<'_>) -> bool {
        let mut failed = false;
        let matched = rule.match_type.combine(rule.conditions.iter().map_while(|condition| {
            let outcome = self.condition_matches(condition, scope);
            failed |= outcome.is_none();
            outcome
        }));
        matched && !failed
    }

    /// `None` when the condition could not be built or evaluated.
    fn condition_matches(&self, condition: &ConditionConfig, scope: &Scope<'_>) -> Option<bool> {
        isolate_or(
            HandlerKind::Condition,
            &condition.condition_type,
            scope.rule_id,
            None,
            || Ok(Some(self.handlers.build_condition(condition, scope)?.matches(scope)?)),
        )
    }
}
