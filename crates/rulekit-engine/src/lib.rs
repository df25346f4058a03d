//! # rulekit-engine
//!
//! Declarative rule evaluation: a rule is a list of conditions combined by a
//! match type, plus the actions to run when it matches.
//!
//! ## Pipeline
//!
//! - [`RuleEngine::execute`](engine::RuleEngine::execute) filters enabled
//!   rules and stable-sorts them by `order` (`0..=999`)
//! - each condition is built by the [`HandlerRegistry`](registry::HandlerRegistry)
//!   and evaluated through the shared operator table in [`operator`]
//! - conditions combine under the rule's [`MatchType`](types::MatchType)
//!   with short-circuit
//! - matching rules hand their actions to the
//!   [`ActionDispatcher`](dispatcher::ActionDispatcher)
//!
//! ## Fail-Closed Conditions, Fail-Open Actions
//!
//! Nothing escapes `execute`. A condition that errors or panics is logged
//! and its rule does not match, whatever the match type; an action that
//! errors or panics is logged and the next action runs.
//!
//! ## Example
//!
//! ```no_run
//! use rulekit_core::Context;
//! use rulekit_engine::{RuleEngine, parse_rules};
//!
//! # fn main() -> rulekit_core::Result<()> {
//! let rules = parse_rules(r#"[{"id": "r", "actions": [{"type": "log", "args": {"msg": "hi"}}]}]"#)?;
//! let report = RuleEngine::with_builtins().execute(&rules, &Context::new());
//! assert_eq!(report.matched, vec!["r"]);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod condition;
pub mod dispatcher;
pub mod engine;
pub mod handler;
pub mod isolate;
pub mod operator;
pub mod registry;
pub mod types;

pub use condition::{ContextPath, ValueCondition, ValueExtractor, evaluate_value};
pub use dispatcher::{ActionDispatcher, DispatchReport};
pub use engine::{ExecutionReport, RuleEngine};
pub use handler::{ActionHandler, ConditionHandler, Scope};
pub use operator::{Operator, compare};
pub use registry::HandlerRegistry;
pub use types::{ActionConfig, ConditionConfig, ConditionValue, MatchType, Rule, RuleMetadata, parse_rules};
