//! Rule, condition, and action definitions.
//!
//! These are plain data, deserialized from rule documents and read-only once
//! handed to the engine. Field names are `snake_case` to match the rule
//! configuration schema:
//!
//! ```json
//! {
//!   "id": "posted",
//!   "match_type": "all",
//!   "order": 10,
//!   "conditions": [{"type": "request_method", "operator": "=", "value": "POST"}],
//!   "actions": [{"type": "log", "args": {"msg": "posted"}}],
//!   "metadata": {"event_name": "init", "event_priority": 10}
//! }
//! ```

use std::fmt;

use rulekit_core::errors::{Result, RuleError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Highest allowed rule order.
pub const MAX_ORDER: u16 = 999;

/// Operator used when a condition omits one.
pub const DEFAULT_OPERATOR: &str = "=";

/// Combining policy over a list of boolean results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// No result is false (logical AND).
    All,
    /// At least one result is true (logical OR).
    Any,
    /// No result is true (logical NOR).
    None,
}

impl MatchType {
    /// Combine results under this policy, stopping as soon as the outcome
    /// is decided.
    ///
    /// An empty input gives `true` for `All` and `None`, `false` for `Any`.
    pub fn combine(self, results: impl IntoIterator<Item = bool>) -> bool {
        let mut results = results.into_iter();
        match self {
            Self::All => results.all(|r| r),
            Self::Any => results.any(|r| r),
            Self::None => !results.any(|r| r),
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Any => write!(f, "any"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Expected value of a condition: one scalar or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    /// Several expected values combined by the condition's match type.
    List(Vec<Value>),
    /// A single expected value.
    Scalar(Value),
}

impl Default for ConditionValue {
    fn default() -> Self {
        Self::Scalar(Value::Null)
    }
}

impl From<Value> for ConditionValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::List(items),
            other => Self::Scalar(other),
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        Self::Scalar(Value::String(value.to_string()))
    }
}

/// Normalize an operator: trim, collapse inner whitespace, upper-case.
pub fn normalize_operator(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

fn default_operator() -> String {
    DEFAULT_OPERATOR.to_string()
}

fn deserialize_operator<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(normalize_operator(&raw))
}

/// A single predicate over the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Handler type, e.g. `request_method`.
    #[serde(rename = "type")]
    pub condition_type: String,
    /// Normalized operator (`=`, `NOT LIKE`, ...).
    #[serde(default = "default_operator", deserialize_with = "deserialize_operator")]
    pub operator: String,
    /// Expected value(s).
    #[serde(default)]
    pub value: ConditionValue,
    /// Combining policy for list values.
    #[serde(default, alias = "matchType", skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MatchType>,
    /// Key inside the extracted source (header name, field name, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Any other keys, passed through to the handler.
    #[serde(flatten)]
    pub args: Map<String, Value>,
}

impl ConditionConfig {
    /// Create a condition. The operator is normalized.
    pub fn new(condition_type: impl Into<String>, operator: &str, value: impl Into<ConditionValue>) -> Self {
        Self {
            condition_type: condition_type.into(),
            operator: normalize_operator(operator),
            value: value.into(),
            match_type: None,
            name: None,
            args: Map::new(),
        }
    }

    /// Set the list combining policy.
    #[must_use]
    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = Some(match_type);
        self
    }

    /// Set the source key.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a handler argument.
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.args.insert(key.into(), value);
        self
    }

    /// Match type applied to list values; `any` when unset.
    pub fn effective_match_type(&self) -> MatchType {
        self.match_type.unwrap_or(MatchType::Any)
    }
}

/// A side effect run when a rule matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Handler type, e.g. `log`.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Handler arguments.
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ActionConfig {
    /// Create an action with no arguments.
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            args: Map::new(),
        }
    }

    /// Add an argument.
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.args.insert(key.into(), value);
        self
    }

    /// Get an argument.
    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }

    /// Get a string argument.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}

/// Event binding metadata for rules driven by host events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleMetadata {
    /// Host event that triggers the rule.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    /// Host-side priority for the event binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_priority: Option<i32>,
}

fn default_enabled() -> bool {
    true
}

fn default_rule_match_type() -> MatchType {
    MatchType::All
}

fn deserialize_order<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u16, D::Error> {
    let raw = i64::deserialize(deserializer)?;
    u16::try_from(raw)
        .ok()
        .filter(|order| *order <= MAX_ORDER)
        .ok_or_else(|| serde::de::Error::custom(RuleError::InvalidOrder { order: raw }))
}

/// Conditions plus actions plus ordering metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier.
    pub id: String,
    /// Human-readable title.
    #[serde(default)]
    pub title: String,
    /// Disabled rules are skipped entirely.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// How conditions combine. Defaults to `all`.
    #[serde(default = "default_rule_match_type", alias = "matchType")]
    pub match_type: MatchType,
    /// Execution order, `0..=999`, ascending.
    #[serde(default, deserialize_with = "deserialize_order")]
    pub order: u16,
    /// Conditions, evaluated in declared order.
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
    /// Actions, executed in declared order.
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
    /// Event binding metadata.
    #[serde(default)]
    pub metadata: RuleMetadata,
}

impl Rule {
    /// Create an enabled, empty rule matching on `all`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            enabled: true,
            match_type: MatchType::All,
            order: 0,
            conditions: Vec::new(),
            actions: Vec::new(),
            metadata: RuleMetadata::default(),
        }
    }

    /// Set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the match type.
    #[must_use]
    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = match_type;
        self
    }

    /// Set the order. Checked by [`validate`](Self::validate).
    #[must_use]
    pub fn with_order(mut self, order: u16) -> Self {
        self.order = order;
        self
    }

    /// Enable or disable.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Append a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: ConditionConfig) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Append an action.
    #[must_use]
    pub fn with_action(mut self, action: ActionConfig) -> Self {
        self.actions.push(action);
        self
    }

    /// Bind to a host event.
    #[must_use]
    pub fn with_event(mut self, event_name: impl Into<String>, priority: Option<i32>) -> Self {
        self.metadata.event_name = Some(event_name.into());
        self.metadata.event_priority = priority;
        self
    }

    /// Check structural constraints the type system does not enforce.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RuleError::invalid("rule id must not be empty"));
        }
        if self.order > MAX_ORDER {
            return Err(RuleError::InvalidOrder {
                order: i64::from(self.order),
            });
        }
        if let Some(condition) = self.conditions.iter().find(|c| c.condition_type.trim().is_empty()) {
            return Err(RuleError::invalid(format!(
                "rule '{}' has a condition without a type (operator '{}')",
                self.id, condition.operator
            )));
        }
        if self.actions.iter().any(|a| a.action_type.trim().is_empty()) {
            return Err(RuleError::invalid(format!(
                "rule '{}' has an action without a type",
                self.id
            )));
        }
        Ok(())
    }
}

/// Parse a rule document: either a JSON array of rules or `{"rules": [...]}`.
///
/// Every rule is decoded and validated on its own, so an error names the
/// offending rule.
pub fn parse_rules(json: &str) -> Result<Vec<Rule>> {
    let items = match serde_json::from_str::<Value>(json)? {
        Value::Array(items) => items,
        Value::Object(mut document) => match document.remove("rules") {
            Some(Value::Array(items)) => items,
            _ => return Err(RuleError::invalid("rule document object needs a \"rules\" array")),
        },
        _ => return Err(RuleError::invalid("rule document must be an array of rules")),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let label = match item.get("id").and_then(Value::as_str) {
                Some(id) => format!("rule '{id}'"),
                None => format!("rule #{index}"),
            };
            let rule: Rule =
                serde_json::from_value(item).map_err(|e| RuleError::invalid(format!("{label}: {e}")))?;
            rule.validate()?;
            Ok(rule)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn operator_normalization() {
        assert_eq!(normalize_operator(" not  like "), "NOT LIKE");
        assert_eq!(normalize_operator("in"), "IN");
        assert_eq!(normalize_operator(">="), ">=");
    }

    #[test]
    fn condition_deserialize_normalizes_operator() {
        let condition: ConditionConfig = serde_json::from_value(json!({
            "type": "request_method",
            "operator": "  not in ",
            "value": ["GET", "HEAD"]
        }))
        .unwrap();
        assert_eq!(condition.operator, "NOT IN");
        assert_eq!(
            condition.value,
            ConditionValue::List(vec![json!("GET"), json!("HEAD")])
        );
        assert_eq!(condition.effective_match_type(), MatchType::Any);
    }

    #[test]
    fn condition_defaults_and_extra_args() {
        let condition: ConditionConfig = serde_json::from_value(json!({
            "type": "header",
            "name": "X-Trace",
            "source": "server"
        }))
        .unwrap();
        assert_eq!(condition.operator, "=");
        assert_eq!(condition.value, ConditionValue::Scalar(Value::Null));
        assert_eq!(condition.name.as_deref(), Some("X-Trace"));
        assert_eq!(condition.args.get("source"), Some(&json!("server")));
    }

    #[test]
    fn camel_case_match_type_accepted() {
        let rule: Rule = serde_json::from_value(json!({"id": "r", "matchType": "any"})).unwrap();
        assert_eq!(rule.match_type, MatchType::Any);
        let condition: ConditionConfig =
            serde_json::from_value(json!({"type": "role", "matchType": "all", "value": ["a"]})).unwrap();
        assert_eq!(condition.match_type, Some(MatchType::All));
    }

    #[test]
    fn explicit_match_type() {
        let condition = ConditionConfig::new("role", "=", json!(["a", "b"])).with_match_type(MatchType::None);
        assert_eq!(condition.effective_match_type(), MatchType::None);
    }

    #[test]
    fn rule_defaults() {
        let rule: Rule = serde_json::from_value(json!({"id": "r1"})).unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.match_type, MatchType::All);
        assert_eq!(rule.order, 0);
        assert!(rule.conditions.is_empty());
        assert_eq!(rule.metadata, RuleMetadata::default());
    }

    #[test]
    fn rule_order_out_of_range_rejected() {
        let err = serde_json::from_value::<Rule>(json!({"id": "r1", "order": 1000})).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        assert!(serde_json::from_value::<Rule>(json!({"id": "r1", "order": -1})).is_err());
        assert!(serde_json::from_value::<Rule>(json!({"id": "r1", "order": 999})).is_ok());
    }

    #[test]
    fn validate_catches_builder_mistakes() {
        assert_matches!(
            Rule::new("r").with_order(1500).validate(),
            Err(RuleError::InvalidOrder { order: 1500 })
        );
        assert_matches!(Rule::new(" ").validate(), Err(RuleError::InvalidRule { .. }));
        assert_matches!(
            Rule::new("r").with_action(ActionConfig::new("")).validate(),
            Err(RuleError::InvalidRule { .. })
        );
        assert!(Rule::new("r").with_order(999).validate().is_ok());
    }

    #[test]
    fn parse_rules_array_and_wrapped() {
        let doc = r#"[{"id": "a", "metadata": {"event_name": "init"}}]"#;
        let rules = parse_rules(doc).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].metadata.event_name.as_deref(), Some("init"));

        let wrapped = r#"{"rules": [{"id": "a"}, {"id": "b", "enabled": false}]}"#;
        let rules = parse_rules(wrapped).unwrap();
        assert_eq!(rules.len(), 2);
        assert!(!rules[1].enabled);
    }

    #[test]
    fn parse_rules_rejects_invalid() {
        assert_matches!(parse_rules("not json"), Err(RuleError::Json(_)));
        assert_matches!(parse_rules(r#"[{"id": ""}]"#), Err(RuleError::InvalidRule { .. }));
        assert_matches!(parse_rules("42"), Err(RuleError::InvalidRule { .. }));
        assert_matches!(parse_rules(r#"{"rule": []}"#), Err(RuleError::InvalidRule { .. }));
    }

    #[test]
    fn parse_rules_names_the_bad_rule() {
        let err = parse_rules(r#"[{"id": "ok"}, {"id": "x", "order": 5000}]"#).unwrap_err();
        assert_matches!(err, RuleError::InvalidRule { .. });
        let message = err.to_string();
        assert!(message.contains("rule 'x'"), "{message}");
        assert!(message.contains("rule order 5000 out of range"), "{message}");

        let err = parse_rules(r#"{"rules": [{"title": "no id"}]}"#).unwrap_err();
        assert!(err.to_string().contains("rule #0"), "{err}");
    }

    #[test]
    fn match_type_combine() {
        assert!(MatchType::All.combine([true, true]));
        assert!(!MatchType::All.combine([true, false]));
        assert!(MatchType::Any.combine([false, true]));
        assert!(!MatchType::Any.combine([false, false]));
        assert!(MatchType::None.combine([false, false]));
        assert!(!MatchType::None.combine([false, true]));
    }

    #[test]
    fn match_type_combine_empty() {
        assert!(MatchType::All.combine(std::iter::empty()));
        assert!(!MatchType::Any.combine(std::iter::empty()));
        assert!(MatchType::None.combine(std::iter::empty()));
    }

    #[test]
    fn action_args() {
        let action = ActionConfig::new("log").with_arg("msg", json!("hi"));
        assert_eq!(action.arg_str("msg"), Some("hi"));
        assert_eq!(action.arg("missing"), None);
    }
}
