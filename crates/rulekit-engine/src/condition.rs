//! Value conditions: extract an actual value, compare it with the
//! configured expected value(s).
//!
//! Most condition types only differ in *where* their actual value comes
//! from. [`ValueCondition`] pairs a [`ValueExtractor`] with the shared
//! evaluation in [`evaluate_value`], so a host adds a condition type by
//! registering an extractor instead of writing a handler.

use std::fmt;
use std::rc::Rc;

use rulekit_core::context::Context;
use rulekit_core::errors::{Result, RuleError};
use serde_json::Value;
use tracing::{trace, warn};

use crate::handler::{ConditionHandler, Scope};
use crate::operator::{Operator, compare_with};
use crate::types::{ConditionConfig, ConditionValue, MatchType};

/// Compare an actual value against a condition's expected value(s).
///
/// - A scalar expected value has placeholders resolved, then is compared.
/// - A list under `IN` / `NOT IN` is resolved element-wise and compared as
///   a whole.
/// - Any other list compares each element on its own and combines the
///   results under `match_type` (default `any`).
///
/// Unknown operators are logged and evaluate to `false`.
pub fn evaluate_value(
    actual: &Value,
    expected: &ConditionValue,
    operator: &str,
    match_type: Option<MatchType>,
    scope: &Scope<'_>,
) -> bool {
    let Some(op) = Operator::parse(operator) else {
        warn!(
            operator,
            rule_id = scope.rule_id,
            "unknown operator, evaluating as false"
        );
        return false;
    };

    match expected {
        ConditionValue::Scalar(value) => compare_with(actual, &scope.resolve_value(value), op),
        ConditionValue::List(items) if op.consumes_list() => {
            let resolved = Value::Array(items.iter().map(|v| scope.resolve_value(v)).collect());
            compare_with(actual, &resolved, op)
        }
        ConditionValue::List(items) => match_type
            .unwrap_or(MatchType::Any)
            .combine(items.iter().map(|v| compare_with(actual, &scope.resolve_value(v), op))),
    }
}

/// Strategy producing the actual value of a condition.
pub trait ValueExtractor {
    /// Extract the value to compare; `None` compares as null.
    fn extract(&self, condition: &ConditionConfig, context: &Context) -> Option<Value>;
}

impl<F> ValueExtractor for F
where
    F: Fn(&ConditionConfig, &Context) -> Option<Value>,
{
    fn extract(&self, condition: &ConditionConfig, context: &Context) -> Option<Value> {
        self(condition, context)
    }
}

/// A dotted path into the context, e.g. `request.method`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPath {
    category: String,
    segments: Vec<String>,
    case_insensitive: bool,
    keyed: bool,
}

impl ContextPath {
    /// Parse `category.segment.segment`. Empty parts are rejected.
    pub fn parse(path: &str) -> Result<Self> {
        let mut parts = path.split('.');
        let category = parts.next().unwrap_or_default().trim();
        let segments: Vec<String> = parts.map(|p| p.trim().to_string()).collect();
        if category.is_empty() || segments.iter().any(String::is_empty) {
            return Err(RuleError::invalid(format!("invalid context path '{path}'")));
        }
        Ok(Self {
            category: category.to_string(),
            segments,
            case_insensitive: false,
            keyed: false,
        })
    }

    /// Ignore key case at every level.
    #[must_use]
    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Append the condition's `name` as a final segment.
    ///
    /// `header` keyed by `name: "X-Trace"` reads `header.X-Trace`.
    #[must_use]
    pub fn keyed(mut self) -> Self {
        self.keyed = true;
        self
    }

    /// Category this path starts in.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Look the path up for one condition.
    pub fn get<'c>(&self, condition: &ConditionConfig, context: &'c Context) -> Option<&'c Value> {
        let mut segments: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        if self.keyed {
            segments.push(condition.name.as_deref()?);
        }
        if self.case_insensitive {
            context.lookup_case_insensitive(&self.category, &segments)
        } else {
            context.lookup(&self.category, &segments)
        }
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.category)?;
        for segment in &self.segments {
            write!(f, ".{segment}")?;
        }
        if self.keyed {
            f.write_str(".<name>")?;
        }
        Ok(())
    }
}

impl ValueExtractor for ContextPath {
    fn extract(&self, condition: &ConditionConfig, context: &Context) -> Option<Value> {
        self.get(condition, context).cloned()
    }
}

/// Condition comparing an extracted value with the configured value.
pub struct ValueCondition {
    config: ConditionConfig,
    extractor: Rc<dyn ValueExtractor>,
}

impl ValueCondition {
    /// Pair a config with its extraction strategy.
    pub fn new(config: ConditionConfig, extractor: Rc<dyn ValueExtractor>) -> Self {
        Self { config, extractor }
    }
}

impl ConditionHandler for ValueCondition {
    fn handler_type(&self) -> &str {
        &self.config.condition_type
    }

    fn matches(&self, scope: &Scope<'_>) -> Result<bool> {
        let actual = self
            .extractor
            .extract(&self.config, scope.context)
            .unwrap_or(Value::Null);
        let matched = evaluate_value(
            &actual,
            &self.config.value,
            &self.config.operator,
            self.config.match_type,
            scope,
        );
        trace!(
            condition_type = %self.config.condition_type,
            operator = %self.config.operator,
            matched,
            "value condition evaluated"
        );
        Ok(matched)
    }
}

/// Built-in `context` condition: reads the dotted `path` argument.
///
/// ```json
/// {"type": "context", "path": "request.query.page", "operator": ">", "value": 1}
/// ```
pub struct ContextValueCondition {
    inner: ValueCondition,
}

impl fmt::Debug for ContextValueCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextValueCondition")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl ContextValueCondition {
    /// Condition type string.
    pub const TYPE: &'static str = "context";

    /// Build from a config; a missing or malformed `path` is a configuration
    /// error.
    pub fn from_config(config: &ConditionConfig) -> Result<Self> {
        let raw = config
            .args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| RuleError::invalid("context condition requires a string 'path' argument"))?;
        let path = ContextPath::parse(raw)?;
        Ok(Self {
            inner: ValueCondition::new(config.clone(), Rc::new(path)),
        })
    }
}

impl ConditionHandler for ContextValueCondition {
    fn handler_type(&self) -> &str {
        Self::TYPE
    }

    fn matches(&self, scope: &Scope<'_>) -> Result<bool> {
        self.inner.matches(scope)
    }
}
