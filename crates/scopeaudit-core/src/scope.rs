//! Audit scope lifecycle
//!
//! An [`AuditScope`] is bound to one in-flight operation. It owns the
//! operation's [`AuditEvent`], applies its [`CreationPolicy`] on start and on
//! end, and offers manual save and discard.
//!
//! # Example
//!
//! ```rust,no_run
//! use scopeaudit_core::{AuditScope, AuditScopeOptions, CreationPolicy, InMemoryDataProvider};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> scopeaudit_core::Result<()> {
//! let provider = Arc::new(InMemoryDataProvider::new());
//!
//! let mut scope = AuditScope::create(
//!     AuditScopeOptions::new("Order:Create")
//!         .policy(CreationPolicy::InsertOnStartReplaceOnEnd)
//!         .data_provider(provider.clone())
//!         .section("order", json!({"id": 42})),
//! )
//! .await?;
//!
//! scope.comment("payment accepted");
//! scope.end().await?;
//!
//! assert_eq!(provider.insert_count(), 1);
//! assert_eq!(provider.replace_count(), 1);
//! # Ok(())
//! # }
//! ```

use crate::error::{AuditError, ProviderError, Result};
use crate::event::AuditEvent;
use crate::policy::{CreationPolicy, Write};
use crate::provider::{DataProvider, EventReference};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of an audit scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// Created, start transition not applied yet.
    NotStarted,
    /// Start transition applied; the operation is in flight.
    Started,
    /// End transition applied. Terminal.
    Ended,
    /// Abandoned without writing. Terminal.
    Discarded,
}

/// Initial data and collaborators for a new [`AuditScope`].
#[derive(Clone)]
pub struct AuditScopeOptions {
    event: AuditEvent,
    policy: CreationPolicy,
    provider: Option<Arc<dyn DataProvider>>,
}

impl AuditScopeOptions {
    /// Options for a fresh event of the given type.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self::from_event(AuditEvent::new(event_type))
    }

    /// Options wrapping an event built by the caller.
    pub fn from_event(event: AuditEvent) -> Self {
        Self {
            event,
            policy: CreationPolicy::default(),
            provider: None,
        }
    }

    /// Set the creation policy.
    pub fn policy(mut self, policy: CreationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the data provider.
    pub fn data_provider(mut self, provider: Arc<dyn DataProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Add a section to the initial event.
    pub fn section(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.event = self.event.section(name, value);
        self
    }

    /// Record the calling method in the event environment.
    pub fn calling_method(mut self, method: impl Into<String>) -> Self {
        self.event.environment.calling_method = Some(method.into());
        self
    }

    /// The initial event.
    pub fn event(&self) -> &AuditEvent {
        &self.event
    }

    /// Mutable access to the initial event.
    pub fn event_mut(&mut self) -> &mut AuditEvent {
        &mut self.event
    }
}

impl fmt::Debug for AuditScopeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditScopeOptions")
            .field("event_type", &self.event.event_type)
            .field("policy", &self.policy)
            .field("has_provider", &self.provider.is_some())
            .finish()
    }
}

/// Lifecycle manager owning one audit event.
///
/// The scope is not meant for concurrent mutation; share it through
/// [`ScopeRegistry`](crate::ScopeRegistry), which wraps it in an async mutex.
pub struct AuditScope {
    event: AuditEvent,
    policy: CreationPolicy,
    provider: Arc<dyn DataProvider>,
    reference: Option<EventReference>,
    state: ScopeState,
    finalized: bool,
}

impl AuditScope {
    /// Build a scope without applying the start transition.
    ///
    /// # Errors
    ///
    /// [`AuditError::Configuration`] when the options carry no data provider.
    pub fn new(options: AuditScopeOptions) -> Result<Self> {
        let AuditScopeOptions {
            event,
            policy,
            provider,
        } = options;
        let provider = provider.ok_or_else(|| {
            AuditError::Configuration("No data provider configured for audit scope".to_string())
        })?;

        Ok(Self {
            event,
            policy,
            provider,
            reference: None,
            state: ScopeState::NotStarted,
            finalized: false,
        })
    }

    /// Build a scope and apply the start transition.
    ///
    /// A failed start-insert drops the scope along with its event; use
    /// [`AuditScope::new`] followed by [`AuditScope::start`] to retry instead.
    ///
    /// # Errors
    ///
    /// [`AuditError::Configuration`] without a data provider, or the error of
    /// the start-insert.
    pub async fn create(options: AuditScopeOptions) -> Result<Self> {
        let mut scope = Self::new(options)?;
        scope.start().await?;
        Ok(scope)
    }

    /// Apply the start transition. No-op unless the scope is not started.
    ///
    /// On failure the scope stays [`ScopeState::NotStarted`] and may be
    /// started again.
    ///
    /// # Errors
    ///
    /// Persistence errors of the start-insert.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != ScopeState::NotStarted {
            return Ok(());
        }

        if let Some(write) = self.policy.write_on_start() {
            self.write(write).await?;
        }
        self.state = ScopeState::Started;
        Ok(())
    }

    /// Apply the end transition.
    ///
    /// The event is finalized (end date, duration) once. The scope moves to
    /// [`ScopeState::Ended`] only after the policy's end write succeeded, so
    /// calling `end` again after an error retries that write. Calling it on an
    /// ended or discarded scope does nothing.
    ///
    /// # Errors
    ///
    /// Persistence errors of the end write.
    pub async fn end(&mut self) -> Result<()> {
        match self.state {
            ScopeState::Ended | ScopeState::Discarded => return Ok(()),
            ScopeState::NotStarted | ScopeState::Started => {}
        }

        if !self.finalized {
            self.event.finalize(Utc::now());
            self.finalized = true;
        }

        if self.state == ScopeState::Started {
            if let Some(write) = self.policy.write_on_end() {
                self.write(write).await?;
            }
        }
        self.state = ScopeState::Ended;
        Ok(())
    }

    /// Save the event now, whatever the policy.
    ///
    /// Inserts while the scope holds no reference and replaces afterwards. A
    /// discarded scope is never written.
    ///
    /// # Errors
    ///
    /// Persistence errors of the insert or replace.
    pub async fn save(&mut self) -> Result<()> {
        if self.state == ScopeState::Discarded {
            tracing::debug!(event_type = %self.event.event_type, "Ignoring save of a discarded audit scope");
            return Ok(());
        }
        let write = CreationPolicy::write_on_save(self.reference.is_some());
        self.write(write).await
    }

    /// Abandon the scope without writing.
    ///
    /// A record already inserted on start stays in the store; it is not
    /// rolled back.
    pub fn discard(&mut self) {
        if self.state != ScopeState::Ended {
            self.state = ScopeState::Discarded;
        }
    }

    /// The audit event.
    pub fn event(&self) -> &AuditEvent {
        &self.event
    }

    /// Mutable access to the audit event.
    pub fn event_mut(&mut self) -> &mut AuditEvent {
        &mut self.event
    }

    /// Add a comment to the event.
    pub fn comment(&mut self, text: impl Into<String>) {
        self.event.comments.push(text.into());
    }

    /// Set a custom field on the event.
    pub fn set_custom_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.event.custom_fields.insert(key.into(), value.into());
    }

    /// Serialize `value` into a named section of the event.
    ///
    /// # Errors
    ///
    /// See [`AuditEvent::set_section`].
    pub fn set_section<T: Serialize + ?Sized>(
        &mut self,
        name: impl Into<String>,
        value: &T,
    ) -> std::result::Result<(), serde_json::Error> {
        self.event.set_section(name, value)
    }

    /// Deserialize a named section of the event. `Ok(None)` when absent.
    pub fn section<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> std::result::Result<Option<T>, serde_json::Error> {
        self.event.typed_section(name)
    }

    /// Event type name.
    pub fn event_type(&self) -> &str {
        &self.event.event_type
    }

    /// The creation policy.
    pub fn policy(&self) -> CreationPolicy {
        self.policy
    }

    /// Reference of the last inserted record, if any insert happened.
    pub fn reference(&self) -> Option<&EventReference> {
        self.reference.as_ref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScopeState {
        self.state
    }

    async fn write(&mut self, write: Write) -> Result<()> {
        match write {
            Write::Insert => {
                let reference = self.provider.insert_event(&self.event).await?;
                if reference.is_empty() {
                    return Err(AuditError::Persistence(ProviderError::Backend(
                        "Data provider returned an empty reference".to_string(),
                    )));
                }
                tracing::debug!(
                    policy = %self.policy,
                    reference = %reference,
                    event_type = %self.event.event_type,
                    "Audit event inserted"
                );
                self.reference = Some(reference);
            }
            Write::Replace => {
                let reference = self.reference.as_ref().ok_or_else(|| {
                    AuditError::Persistence(ProviderError::Backend(
                        "Cannot replace an audit event that was never inserted".to_string(),
                    ))
                })?;
                self.provider.replace_event(reference, &self.event).await?;
                tracing::debug!(
                    policy = %self.policy,
                    reference = %reference,
                    event_type = %self.event.event_type,
                    "Audit event replaced"
                );
            }
        }
        Ok(())
    }
}

impl fmt::Debug for AuditScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditScope")
            .field("event_type", &self.event.event_type)
            .field("policy", &self.policy)
            .field("state", &self.state)
            .field("reference", &self.reference)
            .finish()
    }
}

impl Drop for AuditScope {
    fn drop(&mut self) {
        if self.state == ScopeState::Started {
            tracing::warn!(
                policy = %self.policy,
                event_type = %self.event.event_type,
                "Audit scope dropped without being ended or discarded"
            );
        }
    }
}
