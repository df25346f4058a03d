//! Error taxonomy for rule evaluation.
//!
//! Errors fall into four families:
//!
//! - **Configuration**: unknown operators, unknown handler types, malformed
//!   rules. Evaluated as "no match" / no-op by the engine.
//! - **Handler execution**: a condition or action failed or panicked.
//!   Caught at the per-unit boundary and logged.
//! - **Dependency unavailability**: a package's requirement is missing.
//! - **Event binding**: the host refused a bind; the event stays pending.
//!
//! None of these ever escape the engine's public entry points.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which side of a rule a handler serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    /// Predicate evaluated against the context.
    Condition,
    /// Side effect run when a rule matches.
    Action,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition => write!(f, "condition"),
            Self::Action => write!(f, "action"),
        }
    }
}

/// Errors produced while building or evaluating rules.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Operator string is not in the operator table.
    #[error("unknown operator: {operator}")]
    UnknownOperator {
        /// The normalized operator text.
        operator: String,
    },

    /// No handler factory is registered for a condition/action type.
    #[error("no {kind} handler registered for type '{handler_type}'")]
    UnknownHandler {
        /// Condition or action.
        kind: HandlerKind,
        /// The requested type string.
        handler_type: String,
    },

    /// A rule, condition, or action definition is malformed.
    #[error("invalid rule configuration: {message}")]
    InvalidRule {
        /// Description of the problem.
        message: String,
    },

    /// Rule order outside `0..=999`.
    #[error("rule order {order} out of range (0..=999)")]
    InvalidOrder {
        /// The offending value.
        order: i64,
    },

    /// A handler returned an error.
    #[error("handler error in '{handler_type}': {message}")]
    HandlerFailed {
        /// Handler type string.
        handler_type: String,
        /// Error message from the handler.
        message: String,
    },

    /// A handler panicked.
    #[error("handler '{handler_type}' panicked: {message}")]
    HandlerPanicked {
        /// Handler type string.
        handler_type: String,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// A package or one of its dependencies is not available.
    #[error("package '{name}' is unavailable: {reason}")]
    PackageUnavailable {
        /// Package name.
        name: String,
        /// Why it is unavailable.
        reason: String,
    },

    /// The host refused or failed an event binding.
    #[error("failed to bind event '{event}': {message}")]
    BindFailed {
        /// Event name.
        event: String,
        /// Host-provided message.
        message: String,
    },

    /// Rule document could not be decoded.
    #[error("failed to decode rule JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuleError {
    /// Shorthand for [`RuleError::HandlerFailed`].
    pub fn handler(handler_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerFailed {
            handler_type: handler_type.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`RuleError::InvalidRule`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRule {
            message: message.into(),
        }
    }

    /// Whether this error stems from configuration rather than execution.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownOperator { .. }
                | Self::UnknownHandler { .. }
                | Self::InvalidRule { .. }
                | Self::InvalidOrder { .. }
                | Self::Json(_)
        )
    }
}

/// Result type for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn unknown_handler_display() {
        let err = RuleError::UnknownHandler {
            kind: HandlerKind::Action,
            handler_type: "send_mail".into(),
        };
        assert_eq!(
            err.to_string(),
            "no action handler registered for type 'send_mail'"
        );
    }

    #[test]
    fn shorthand_constructors_fill_fields() {
        assert_matches!(
            RuleError::handler("log", "disk full"),
            RuleError::HandlerFailed { handler_type, message } if handler_type == "log" && message == "disk full"
        );
        assert_matches!(
            RuleError::invalid("no id"),
            RuleError::InvalidRule { message } if message == "no id"
        );
    }

    #[test]
    fn handler_shorthand() {
        let err = RuleError::handler("log", "disk full");
        assert_eq!(err.to_string(), "handler error in 'log': disk full");
        assert!(!err.is_configuration());
    }

    #[test]
    fn invalid_order_is_configuration() {
        let err = RuleError::InvalidOrder { order: 1200 };
        assert!(err.is_configuration());
        assert!(err.to_string().contains("1200"));
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: RuleError = json_err.into();
        assert_matches!(err, RuleError::Json(_));
        assert!(err.is_configuration());
    }

    #[test]
    fn handler_kind_serde() {
        let json = serde_json::to_string(&HandlerKind::Condition).unwrap();
        assert_eq!(json, "\"condition\"");
        assert_eq!(HandlerKind::Action.to_string(), "action");
    }
}
