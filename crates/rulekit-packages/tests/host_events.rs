//! Packages, rules, and a host event loop wired together.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use rulekit_core::Result;
use rulekit_core::logging::capture_logs;
use rulekit_engine::{RuleEngine, parse_rules};
use rulekit_packages::{
    BindingState, ContextFragment, EventCallback, EventHost, HookGateway, Package, PackageRegistry, StaticPackage,
};
use serde_json::{Value, json};

/// Host that becomes ready on demand and dispatches fired events.
#[derive(Default)]
struct FakeHost {
    ready: Cell<bool>,
    bind_calls: RefCell<Vec<String>>,
    listeners: RefCell<HashMap<String, Rc<dyn Fn(&[Value])>>>,
}

impl FakeHost {
    fn dispatch(&self, event: &str, args: &[Value]) {
        let listener = self.listeners.borrow().get(event).cloned();
        if let Some(listener) = listener {
            listener(args);
        }
    }
}

impl EventHost for FakeHost {
    fn is_ready(&self) -> bool {
        self.ready.get()
    }

    fn bind(&self, event: &str, _priority: i32, callback: EventCallback) -> Result<()> {
        self.bind_calls.borrow_mut().push(event.to_string());
        let _ = self.listeners.borrow_mut().insert(event.to_string(), Rc::from(callback));
        Ok(())
    }
}

/// Request package building its fragment from mutable host state.
struct RequestPackage {
    method: Rc<RefCell<String>>,
    builds: Rc<Cell<usize>>,
}

impl Package for RequestPackage {
    fn name(&self) -> &str {
        "http"
    }

    fn namespaces(&self) -> Vec<String> {
        vec!["request".into(), "cookie".into()]
    }

    fn build_context_fragment(&self) -> Result<ContextFragment> {
        self.builds.set(self.builds.get() + 1);
        Ok(ContextFragment::new()
            .with("request", json!({"method": self.method.borrow().clone()}))
            .with("cookie", json!({"session_id": "abc"})))
    }
}

struct Harness {
    host: Rc<FakeHost>,
    packages: Rc<RefCell<PackageRegistry>>,
    gateway: Rc<HookGateway>,
    method: Rc<RefCell<String>>,
    builds: Rc<Cell<usize>>,
}

fn harness() -> Harness {
    let host = Rc::new(FakeHost::default());
    let method = Rc::new(RefCell::new("GET".to_string()));
    let builds = Rc::new(Cell::new(0));

    let packages = Rc::new(RefCell::new(PackageRegistry::new()));
    packages.borrow_mut().register(RequestPackage {
        method: Rc::clone(&method),
        builds: Rc::clone(&builds),
    });

    let mut engine = RuleEngine::with_builtins();
    engine
        .handlers_mut()
        .register_path_condition("request_method", "request.method")
        .unwrap();

    let gateway = HookGateway::new(host.clone(), Rc::clone(&packages), Rc::new(engine));
    Harness {
        host,
        packages,
        gateway,
        method,
        builds,
    }
}

const RULES: &str = r#"[
    {
        "id": "posted",
        "conditions": [{"type": "request_method", "value": "POST"}],
        "actions": [{"type": "log", "args": {"msg": "posted by {cookie:session_id} via {hook:name}"}}],
        "metadata": {"event_name": "init"}
    },
    {
        "id": "saved",
        "actions": [{"type": "log", "args": {"msg": "saved"}}],
        "metadata": {"event_name": "save_post", "event_priority": 20}
    }
]"#;

#[test]
fn deferred_rules_fire_after_host_becomes_ready() {
    let (logs, _guard) = capture_logs();
    let h = harness();
    h.gateway.register_rules(parse_rules(RULES).unwrap()).unwrap();
    assert_eq!(h.gateway.state("init"), BindingState::Pending(10));
    assert_eq!(h.gateway.state("save_post"), BindingState::Pending(20));

    h.host.ready.set(true);
    assert_eq!(h.gateway.flush_pending(), 2);
    assert_eq!(h.gateway.flush_pending(), 0);
    assert_eq!(*h.host.bind_calls.borrow(), vec!["init", "save_post"]);

    *h.method.borrow_mut() = "POST".to_string();
    h.host.dispatch("init", &[]);
    assert!(logs.has_message("posted by abc via init"));
    assert_eq!(h.builds.get(), 1);
}

#[test]
fn context_is_rebuilt_per_event() {
    let (logs, _guard) = capture_logs();
    let h = harness();
    h.host.ready.set(true);
    h.gateway.register_rules(parse_rules(RULES).unwrap()).unwrap();

    h.host.dispatch("init", &[]);
    assert!(!logs.has_message("posted by"));

    *h.method.borrow_mut() = "POST".to_string();
    h.host.dispatch("init", &[]);
    assert!(logs.has_message("posted by abc"));
    assert_eq!(h.builds.get(), 2);
}

#[test]
fn reload_does_not_duplicate_bindings() {
    let h = harness();
    h.host.ready.set(true);
    h.gateway.register_rules(parse_rules(RULES).unwrap()).unwrap();

    for _ in 0..3 {
        h.gateway.clear_rules();
        h.gateway.register_rules(parse_rules(RULES).unwrap()).unwrap();
    }

    assert_eq!(*h.host.bind_calls.borrow(), vec!["init", "save_post"]);
    assert_eq!(h.gateway.rules_for("init").len(), 1);
}

#[test]
fn registry_reset_leaves_bindings_alone() {
    let h = harness();
    h.host.ready.set(true);
    h.gateway.register_rules(parse_rules(RULES).unwrap()).unwrap();

    h.packages.borrow_mut().reset();
    assert!(h.packages.borrow().is_empty());
    assert_eq!(h.gateway.registered_events(), vec!["init", "save_post"]);

    // Firing without packages still runs rules that need no context.
    let report = h.gateway.fire("save_post", &[json!(1)]);
    assert_eq!(report.matched, vec!["saved"]);
}

#[test]
fn unavailable_dependency_hides_fragment_and_rules() {
    let mut registry = PackageRegistry::new();
    registry.register(StaticPackage::new("cms").available(false));
    registry.register(
        StaticPackage::new("shop")
            .requires("cms")
            .with_category("cart", json!({"total": 10})),
    );
    registry
        .register_rules("shop", parse_rules(r#"[{"id": "big-cart"}]"#).unwrap())
        .unwrap();

    let ctx = registry.build_context();
    assert!(!ctx.contains("cart"));
    assert!(registry.rules().is_empty());

    let report = RuleEngine::with_builtins().execute(&registry.rules(), &ctx);
    assert!(report.matched.is_empty());
}
