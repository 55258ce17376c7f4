//! # scopeaudit-core
//!
//! Audit scope lifecycle engine.
//!
//! A host opens an [`AuditScope`] when a unit of work begins, mutates the
//! scope's [`AuditEvent`] while the work runs, and ends the scope when it
//! completes. The scope's [`CreationPolicy`] decides when the event is
//! inserted into or replaced in the [`DataProvider`]. A [`ScopeRegistry`]
//! keeps the active scope of each request or operation reachable by key.
//!
//! ## Modules
//!
//! - [`event`] - the audit event record
//! - [`provider`] - storage trait, in-memory and file providers
//! - [`policy`] - creation policies and their transition table
//! - [`scope`] - the audit scope state machine
//! - [`registry`] - context-keyed scope registry
//! - [`config`] - environment-driven configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use scopeaudit_core::{AuditScope, AuditScopeOptions, CreationPolicy, InMemoryDataProvider, ScopeRegistry};
//! use std::sync::Arc;
//!
//! # async fn run() -> scopeaudit_core::Result<()> {
//! let provider = Arc::new(InMemoryDataProvider::new());
//! let registry = ScopeRegistry::new();
//!
//! let scope = AuditScope::create(
//!     AuditScopeOptions::new("Report:Export")
//!         .policy(CreationPolicy::InsertOnEnd)
//!         .data_provider(provider.clone()),
//! )
//! .await?;
//! registry.attach("request-1".to_string(), scope);
//!
//! // ...deeper in the call chain
//! if let Some(shared) = registry.retrieve(&"request-1".to_string()) {
//!     shared.lock().await.set_custom_field("rows", 1200);
//! }
//!
//! if let Some(shared) = registry.detach(&"request-1".to_string()) {
//!     shared.lock().await.end().await?;
//! }
//! assert_eq!(provider.insert_count(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod event;
pub mod policy;
pub mod provider;
pub mod registry;
pub mod scope;

pub use config::{AuditConfig, ProviderKind};
pub use error::{AuditError, ProviderError, ProviderResult, Result};
pub use event::{AuditEnvironment, AuditEvent};
pub use policy::{CreationPolicy, Write};
pub use provider::file::{FileDataProvider, FileDataProviderConfig};
pub use provider::memory::InMemoryDataProvider;
pub use provider::{BlockingProvider, DataProvider, EventReference, SyncDataProvider};
pub use registry::{ScopeRegistry, SharedScope};
pub use scope::{AuditScope, AuditScopeOptions, ScopeState};
