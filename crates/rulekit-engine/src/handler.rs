//! Condition and action handler contracts.
//!
//! A handler is built per rule evaluation by a factory in the
//! [`HandlerRegistry`](crate::registry::HandlerRegistry) and receives a
//! [`Scope`]: the context, the placeholder resolver, and the id of the rule
//! being evaluated.

use std::fmt;
use std::rc::Rc;

use rulekit_core::context::Context;
use rulekit_core::errors::Result;
use rulekit_core::placeholder::PlaceholderResolver;
use serde_json::Value;
use tracing::{Level, debug, error, info, trace, warn};

use crate::types::{ActionConfig, ConditionConfig};

/// Everything a handler can see while it runs.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    /// The merged context for this evaluation pass.
    pub context: &'a Context,
    /// Placeholder resolver bound to the engine.
    pub placeholders: &'a PlaceholderResolver,
    /// Id of the rule being evaluated.
    pub rule_id: &'a str,
}

impl<'a> Scope<'a> {
    /// Create a scope.
    pub fn new(context: &'a Context, placeholders: &'a PlaceholderResolver, rule_id: &'a str) -> Self {
        Self {
            context,
            placeholders,
            rule_id,
        }
    }

    /// Substitute placeholders in a string.
    pub fn resolve(&self, raw: &str) -> String {
        self.placeholders.resolve(raw, self.context)
    }

    /// Substitute placeholders in a JSON value (strings only).
    pub fn resolve_value(&self, value: &Value) -> Value {
        self.placeholders.resolve_value(value, self.context)
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("rule_id", &self.rule_id)
            .field("context", self.context)
            .finish_non_exhaustive()
    }
}

/// A predicate over the context.
pub trait ConditionHandler {
    /// The condition type this handler serves.
    fn handler_type(&self) -> &str;

    /// Evaluate against the scope's context.
    fn matches(&self, scope: &Scope<'_>) -> Result<bool>;
}

/// A side effect run when a rule matches.
pub trait ActionHandler {
    /// The action type this handler serves.
    fn handler_type(&self) -> &str;

    /// Perform the action.
    fn execute(&self, scope: &Scope<'_>) -> Result<()>;
}

impl fmt::Debug for dyn ConditionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionHandler")
            .field("handler_type", &self.handler_type())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for dyn ActionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHandler")
            .field("handler_type", &self.handler_type())
            .finish_non_exhaustive()
    }
}

/// Closure signature backing a [`CallbackCondition`].
pub type ConditionCallback = Rc<dyn Fn(&ConditionConfig, &Scope<'_>) -> Result<bool>>;

/// Closure signature backing a [`CallbackAction`].
pub type ActionCallback = Rc<dyn Fn(&ActionConfig, &Scope<'_>) -> Result<()>>;

/// Condition backed by a plain closure.
pub struct CallbackCondition {
    config: ConditionConfig,
    callback: ConditionCallback,
}

impl CallbackCondition {
    /// Wrap a closure for one condition config.
    pub fn new(config: ConditionConfig, callback: ConditionCallback) -> Self {
        Self { config, callback }
    }
}

impl ConditionHandler for CallbackCondition {
    fn handler_type(&self) -> &str {
        &self.config.condition_type
    }

    fn matches(&self, scope: &Scope<'_>) -> Result<bool> {
        (self.callback)(&self.config, scope)
    }
}

/// Action backed by a plain closure.
pub struct CallbackAction {
    config: ActionConfig,
    callback: ActionCallback,
}

impl CallbackAction {
    /// Wrap a closure for one action config.
    pub fn new(config: ActionConfig, callback: ActionCallback) -> Self {
        Self { config, callback }
    }
}

impl ActionHandler for CallbackAction {
    fn handler_type(&self) -> &str {
        &self.config.action_type
    }

    fn execute(&self, scope: &Scope<'_>) -> Result<()> {
        (self.callback)(&self.config, scope)
    }
}

/// Target used by [`LogAction`] events.
pub const LOG_ACTION_TARGET: &str = "rulekit::action";

/// Built-in `log` action.
///
/// Args: `msg` (or `message`), placeholder-resolved; `level`
/// (`trace`..`error`, default `info`).
#[derive(Debug, Clone)]
pub struct LogAction {
    message: String,
    level: Level,
}

impl LogAction {
    /// Action type string.
    pub const TYPE: &'static str = "log";

    /// Build from an action config. Unknown levels fall back to `info`.
    pub fn from_config(config: &ActionConfig) -> Self {
        let message = config
            .arg_str("msg")
            .or_else(|| config.arg_str("message"))
            .unwrap_or_default()
            .to_string();
        let level = config
            .arg_str("level")
            .and_then(|raw| raw.parse::<Level>().ok())
            .unwrap_or(Level::INFO);
        Self { message, level }
    }
}

impl ActionHandler for LogAction {
    fn handler_type(&self) -> &str {
        Self::TYPE
    }

    fn execute(&self, scope: &Scope<'_>) -> Result<()> {
        let message = scope.resolve(&self.message);
        let rule_id = scope.rule_id;
        match self.level {
            Level::ERROR => error!(target: LOG_ACTION_TARGET, rule_id, "{message}"),
            Level::WARN => warn!(target: LOG_ACTION_TARGET, rule_id, "{message}"),
            Level::DEBUG => debug!(target: LOG_ACTION_TARGET, rule_id, "{message}"),
            Level::TRACE => trace!(target: LOG_ACTION_TARGET, rule_id, "{message}"),
            _ => info!(target: LOG_ACTION_TARGET, rule_id, "{message}"),
        }
        Ok(())
    }
}
