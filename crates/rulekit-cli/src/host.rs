//! Event host for one-shot CLI runs.

use std::cell::RefCell;
use std::collections::BTreeMap;

use rulekit_core::Result;
use rulekit_packages::{EventCallback, EventHost};

/// A host that is ready from the start and only records bindings.
///
/// The CLI fires events through the gateway directly, so the callbacks are
/// kept only to report what was bound.
#[derive(Default)]
pub struct OneShotHost {
    bindings: RefCell<BTreeMap<String, i32>>,
}

impl OneShotHost {
    /// Bound events with their priorities, by name.
    pub fn bindings(&self) -> BTreeMap<String, i32> {
        self.bindings.borrow().clone()
    }
}

impl EventHost for OneShotHost {
    fn is_ready(&self) -> bool {
        true
    }

    fn bind(&self, event: &str, priority: i32, _callback: EventCallback) -> Result<()> {
        let _ = self.bindings.borrow_mut().insert(event.to_string(), priority);
        Ok(())
    }
}
