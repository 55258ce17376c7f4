//! # scopeaudit-action
//!
//! Audits controller actions of a web host as [`scopeaudit_core`] scopes.
//!
//! The host calls the [`ActionAuditFilter`] hooks around each action:
//!
//! 1. [`on_action_executing`](ActionAuditFilter::on_action_executing) opens a
//!    scope with the request data in its `"action"` section,
//! 2. [`on_action_executed`](ActionAuditFilter::on_action_executed) records
//!    the model state, result and exception,
//! 3. [`on_result_executed`](ActionAuditFilter::on_result_executed) records
//!    the response status and ends the scope.
//!
//! While the request is in flight the action can reach its scope through
//! [`ActionAuditFilter::current_scope`] to add comments or custom fields.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod action;
mod context;
mod error;
mod filter;

pub use action::{ActionEventExt, AuditAction, ACTION_SECTION};
pub use context::ActionContext;
pub use error::{ActionAuditError, Result};
pub use filter::{ActionAuditFilter, ActionOutcome, DEFAULT_EVENT_TYPE};
