//! Per-unit failure isolation.
//!
//! Every handler invocation runs inside [`isolate`]: returned errors pass
//! through, panics are caught and turned into
//! [`RuleError::HandlerPanicked`]. Callers decide what a failure means
//! (a rule with a failed condition does not match, an action is skipped).

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use rulekit_core::errors::{HandlerKind, Result, RuleError};
use tracing::warn;

/// Run `f`, converting a panic into an error.
pub fn isolate<T>(handler_type: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(RuleError::HandlerPanicked {
            handler_type: handler_type.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

/// Run `f` isolated for `rule_id`; on any failure log it and return
/// `fallback`.
pub fn isolate_or<T>(
    kind: HandlerKind,
    handler_type: &str,
    rule_id: &str,
    fallback: T,
    f: impl FnOnce() -> Result<T>,
) -> T {
    match isolate(handler_type, f) {
        Ok(value) => value,
        Err(error) => {
            warn!(%kind, handler_type, rule_id, %error, "{kind} failed");
            fallback
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rulekit_core::logging::capture_logs;
    use tracing::Level;

    #[test]
    fn ok_passes_through() {
        let value = isolate("t", || Ok(7)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn error_passes_through() {
        let result: Result<()> = isolate("t", || Err(RuleError::handler("t", "boom")));
        assert_matches!(result, Err(RuleError::HandlerFailed { .. }));
    }

    #[test]
    fn panic_becomes_error() {
        let result: Result<()> = isolate("exploder", || panic!("kaboom"));
        assert_matches!(
            result,
            Err(RuleError::HandlerPanicked { handler_type, message })
                if handler_type == "exploder" && message == "kaboom"
        );
    }

    #[test]
    fn formatted_panic_message_captured() {
        let code = 42;
        let result: Result<()> = isolate("t", || panic!("code {code}"));
        assert_matches!(result, Err(RuleError::HandlerPanicked { message, .. }) if message == "code 42");
    }

    #[test]
    fn isolate_or_logs_and_falls_back() {
        let (logs, _guard) = capture_logs();
        let matched = isolate_or(HandlerKind::Condition, "flaky", "r1", false, || {
            Err(RuleError::handler("flaky", "db down"))
        });
        assert!(!matched);
        assert!(logs.has_event(Level::WARN, "condition failed"));

        let events = logs.events_with_field("handler_type", "flaky");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::WARN);
        assert_eq!(events[0].field("kind"), Some("condition"));
        assert_eq!(events[0].field("rule_id"), Some("r1"));
    }
}
