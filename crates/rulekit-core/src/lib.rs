//! # rulekit-core
//!
//! Foundation types shared by every rulekit crate:
//!
//! - **Context**: the merged tree of named fragments rules evaluate against,
//!   with optional lazily-built categories
//! - **Placeholders**: `{category:segment:...}` token resolution against a
//!   [`Context`](context::Context), with pluggable per-category resolvers
//! - **Scalar casts**: string/bool/numeric casts used by operators and
//!   placeholder substitution
//! - **Errors**: the [`RuleError`](errors::RuleError) taxonomy via `thiserror`
//! - **Logging**: `tracing` subscriber bootstrap and test capture utilities

#![deny(unsafe_code)]

pub mod context;
pub mod errors;
pub mod logging;
pub mod placeholder;
pub mod value;

pub use context::{Context, Fragment, deep_merge};
pub use errors::{HandlerKind, Result, RuleError};
pub use placeholder::{PlaceholderResolver, PlaceholderToken};
