//! Deferred event binding.
//!
//! Rules carrying `metadata.event_name` run when the host fires that event.
//! The host may not be able to accept bindings yet when rules are
//! registered, so each event name moves through a small state machine:
//!
//! ```text
//! Unregistered ──register_rule, host not ready──▶ Pending(priority)
//!      │                                              │
//!      └──────register_rule, host ready──▶ Registered ◀──flush_pending
//! ```
//!
//! `Registered` is terminal: an event name is bound with the host at most
//! once per gateway, no matter how often rules are cleared and re-added.
//! A failed bind leaves the event `Pending` for the next attempt.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use rulekit_core::errors::{Result, RuleError};
use rulekit_engine::engine::{ExecutionReport, RuleEngine};
use rulekit_engine::isolate::isolate;
use rulekit_engine::types::Rule;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::registry::PackageRegistry;

/// Priority used when a rule's metadata carries none.
pub const DEFAULT_EVENT_PRIORITY: i32 = 10;

/// Context category holding `{name, args}` of the firing event.
pub const HOOK_CATEGORY: &str = "hook";

/// Callback handed to the host; receives the event's argument list.
pub type EventCallback = Box<dyn Fn(&[Value])>;

/// What the gateway needs from the host's event system.
pub trait EventHost {
    /// Whether the host accepts bindings right now.
    fn is_ready(&self) -> bool;

    /// Bind `callback` to `event` at `priority`.
    fn bind(&self, event: &str, priority: i32, callback: EventCallback) -> Result<()>;
}

/// Binding state of one event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Never seen.
    Unregistered,
    /// Waiting for the host, with the priority to bind at.
    Pending(i32),
    /// Bound with the host. Terminal.
    Registered,
}

/// Gateway tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOptions {
    /// Priority for rules without `event_priority`.
    pub default_priority: i32,
    /// Category the event name and arguments are stored under.
    pub hook_category: String,
    /// Package owning the gateway's rules; while it is unavailable events
    /// fire nothing.
    pub package: Option<String>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            default_priority: DEFAULT_EVENT_PRIORITY,
            hook_category: HOOK_CATEGORY.to_string(),
            package: None,
        }
    }
}

/// Groups rules by host event and binds each event once.
///
/// Single-threaded: shares the package registry and engine through `Rc`.
/// Host callbacks hold a weak reference, so dropping the gateway turns
/// later fires into no-ops.
pub struct HookGateway {
    this: Weak<HookGateway>,
    host: Rc<dyn EventHost>,
    packages: Rc<RefCell<PackageRegistry>>,
    engine: Rc<RuleEngine>,
    options: GatewayOptions,
    states: RefCell<HashMap<String, BindingState>>,
    pending: RefCell<Vec<String>>,
    rules: RefCell<HashMap<String, Vec<Rule>>>,
}

impl HookGateway {
    /// Create a gateway with default options.
    pub fn new(
        host: Rc<dyn EventHost>,
        packages: Rc<RefCell<PackageRegistry>>,
        engine: Rc<RuleEngine>,
    ) -> Rc<Self> {
        Self::with_options(host, packages, engine, GatewayOptions::default())
    }

    /// Create a gateway.
    pub fn with_options(
        host: Rc<dyn EventHost>,
        packages: Rc<RefCell<PackageRegistry>>,
        engine: Rc<RuleEngine>,
        options: GatewayOptions,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            host,
            packages,
            engine,
            options,
            states: RefCell::new(HashMap::new()),
            pending: RefCell::new(Vec::new()),
            rules: RefCell::new(HashMap::new()),
        })
    }

    /// Store a rule under its event and bind the event if possible.
    ///
    /// The rule must carry `metadata.event_name`. Bind failures are logged
    /// and leave the event pending; they do not fail the registration.
    pub fn register_rule(&self, rule: Rule) -> Result<()> {
        let event = rule
            .metadata
            .event_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| RuleError::invalid(format!("rule '{}' has no event_name", rule.id)))?;
        rule.validate()?;
        let priority = rule.metadata.event_priority.unwrap_or(self.options.default_priority);

        debug!(rule_id = %rule.id, event = %event, priority, "registering event rule");
        self.rules.borrow_mut().entry(event.clone()).or_default().push(rule);

        if !self.host.is_ready() {
            self.mark_pending(&event, priority);
            return Ok(());
        }

        let _ = self.flush_pending();
        if self.state(&event) != BindingState::Registered {
            let _ = self.bind_event(&event, priority);
        }
        Ok(())
    }

    /// Register several rules; stops at the first configuration error.
    pub fn register_rules(&self, rules: impl IntoIterator<Item = Rule>) -> Result<()> {
        rules.into_iter().try_for_each(|rule| self.register_rule(rule))
    }

    /// Bind every pending event, in the order they became pending.
    ///
    /// Returns how many were bound. Idempotent; a no-op while the host is
    /// not ready.
    pub fn flush_pending(&self) -> usize {
        if !self.host.is_ready() {
            debug!("host not ready, keeping events pending");
            return 0;
        }
        let queued: Vec<String> = self.pending.borrow().clone();
        let mut bound = 0;
        for event in &queued {
            if let BindingState::Pending(priority) = self.state(event) {
                if self.bind_event(event, priority) {
                    bound += 1;
                }
            }
        }
        bound
    }

    fn mark_pending(&self, event: &str, priority: i32) {
        let mut states = self.states.borrow_mut();
        match states.get(event) {
            Some(BindingState::Registered | BindingState::Pending(_)) => {}
            Some(BindingState::Unregistered) | None => {
                debug!(event, priority, "event pending until host is ready");
                let _ = states.insert(event.to_string(), BindingState::Pending(priority));
                self.pending.borrow_mut().push(event.to_string());
            }
        }
    }

    fn bind_event(&self, event: &str, priority: i32) -> bool {
        let weak = self.this.clone();
        let name = event.to_string();
        let callback: EventCallback = Box::new(move |args: &[Value]| {
            if let Some(gateway) = weak.upgrade() {
                let _ = gateway.fire(&name, args);
            }
        });

        match self.host.bind(event, priority, callback) {
            Ok(()) => {
                debug!(event, priority, "event bound");
                let _ = self
                    .states
                    .borrow_mut()
                    .insert(event.to_string(), BindingState::Registered);
                self.pending.borrow_mut().retain(|queued| queued != event);
                true
            }
            Err(error) => {
                warn!(event, %error, "event bind failed, keeping pending");
                self.mark_pending(event, priority);
                false
            }
        }
    }

    /// Run the rules grouped under `event`.
    ///
    /// Builds a fresh context from the package registry and stores
    /// `{"name": event, "args": args}` under the hook category. Never fails
    /// or panics into the caller.
    pub fn fire(&self, event: &str, args: &[Value]) -> ExecutionReport {
        let outcome = isolate(event, || Ok(self.run_event(event, args)));
        outcome.unwrap_or_else(|error| {
            warn!(event, %error, "event handling failed");
            ExecutionReport::default()
        })
    }

    fn run_event(&self, event: &str, args: &[Value]) -> ExecutionReport {
        if let Some(owner) = &self.options.package {
            if !self.packages.borrow().is_available(owner) {
                debug!(event, package = %owner, "owning package unavailable, skipping event");
                return ExecutionReport::default();
            }
        }

        let mut group = self.rules_for(event);
        if group.is_empty() {
            return ExecutionReport::default();
        }
        group.sort_by_key(|rule| rule.order);

        let mut context = self.packages.borrow().build_context();
        context.insert(
            self.options.hook_category.clone(),
            json!({"name": event, "args": args}),
        );

        debug!(event, rules = group.len(), "firing event rules");
        self.engine.execute(&group, &context)
    }

    /// Drop stored rules and pending events. Registered events stay bound.
    pub fn clear_rules(&self) {
        self.rules.borrow_mut().clear();
        let dropped: Vec<String> = self.pending.borrow_mut().drain(..).collect();
        let mut states = self.states.borrow_mut();
        for event in &dropped {
            let _ = states.remove(event);
        }
        debug!(dropped_pending = dropped.len(), "cleared event rules");
    }

    /// Current state of an event name.
    pub fn state(&self, event: &str) -> BindingState {
        self.states
            .borrow()
            .get(event)
            .copied()
            .unwrap_or(BindingState::Unregistered)
    }

    /// Events waiting for the host, in queue order.
    pub fn pending_events(&self) -> Vec<String> {
        self.pending.borrow().clone()
    }

    /// Events bound with the host, sorted.
    pub fn registered_events(&self) -> Vec<String> {
        let mut events: Vec<String> = self
            .states
            .borrow()
            .iter()
            .filter(|(_, state)| **state == BindingState::Registered)
            .map(|(event, _)| event.clone())
            .collect();
        events.sort();
        events
    }

    /// Rules stored under an event, in registration order.
    pub fn rules_for(&self, event: &str) -> Vec<Rule> {
        self.rules.borrow().get(event).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for HookGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookGateway")
            .field("pending", &self.pending_events())
            .field("registered", &self.registered_events())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
