//! # rulekit-packages
//!
//! Where rule evaluation meets the host:
//!
//! - [`Package`](package::Package): a named context provider with an
//!   availability predicate and dependencies
//! - [`PackageRegistry`](registry::PackageRegistry): resolves the available
//!   set, merges fragments in dependency order, owns per-package rules
//! - [`HookGateway`](gateway::HookGateway): binds rules to host events once
//!   the host is ready, and runs them when the event fires
//!
//! Everything here is single-threaded (`Rc` / `RefCell`). Hosts running
//! several execution contexts create one registry and gateway per context.

#![deny(unsafe_code)]

pub mod gateway;
pub mod package;
pub mod registry;

pub use gateway::{BindingState, EventCallback, EventHost, GatewayOptions, HookGateway};
pub use package::{ContextFragment, Package, StaticPackage};
pub use registry::{Availability, PackageRegistry};
