//! Action dispatch with per-action failure isolation.

use rulekit_core::errors::HandlerKind;
use serde::Serialize;
use tracing::{debug, warn};

use crate::handler::Scope;
use crate::isolate::isolate;
use crate::registry::HandlerRegistry;
use crate::types::ActionConfig;

/// One action that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionFailure {
    /// Type of the failed action.
    pub action_type: String,
    /// Error text.
    pub message: String,
}

/// Outcome of one dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Actions that completed.
    pub executed: usize,
    /// Actions that failed (lookup, construction, execution, or panic).
    pub failed: usize,
    /// Details for each failure, in execution order.
    pub failures: Vec<ActionFailure>,
}

impl DispatchReport {
    /// Fold another report into this one.
    pub fn absorb(&mut self, other: DispatchReport) {
        self.executed += other.executed;
        self.failed += other.failed;
        self.failures.extend(other.failures);
    }
}

/// Runs a rule's actions in declared order.
///
/// A failing action never stops the ones after it.
#[derive(Debug, Clone, Copy)]
pub struct ActionDispatcher<'r> {
    registry: &'r HandlerRegistry,
}

impl<'r> ActionDispatcher<'r> {
    /// Dispatch through `registry`.
    pub fn new(registry: &'r HandlerRegistry) -> Self {
        Self { registry }
    }

    /// Run every action. Never fails.
    pub fn run(&self, actions: &[ActionConfig], scope: &Scope<'_>) -> DispatchReport {
        let mut report = DispatchReport::default();
        for action in actions {
            let result = isolate(&action.action_type, || {
                let handler = self.registry.build_action(action, scope)?;
                handler.execute(scope)
            });
            match result {
                Ok(()) => {
                    debug!(action_type = %action.action_type, rule_id = scope.rule_id, "action executed");
                    report.executed += 1;
                }
                Err(error) => {
                    warn!(
                        kind = %HandlerKind::Action,
                        handler_type = %action.action_type,
                        rule_id = scope.rule_id,
                        %error,
                        "action failed"
                    );
                    report.failed += 1;
                    report.failures.push(ActionFailure {
                        action_type: action.action_type.clone(),
                        message: error.to_string(),
                    });
                }
            }
        }
        report
    }
}
