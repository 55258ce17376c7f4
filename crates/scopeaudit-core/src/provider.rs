//! Data provider abstraction
//!
//! A data provider stores audit events. It has exactly two operations:
//! `insert_event` creates a record and returns an opaque [`EventReference`],
//! `replace_event` overwrites the record behind a reference.
//!
//! The core only talks to the async [`DataProvider`] trait. Blocking
//! implementations write against [`SyncDataProvider`] and are plugged in
//! through [`BlockingProvider`], which runs each call on the tokio blocking
//! pool.

use crate::error::{ProviderError, ProviderResult};
use crate::event::AuditEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub mod file;
pub mod memory;

/// Opaque, provider-defined handle to a stored event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventReference(String);

impl EventReference {
    /// Wrap a provider-specific identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty (never valid for a stored event).
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Consume the reference, returning the identifier.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EventReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventReference {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EventReference {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Storage backend for audit events.
///
/// Implementations must never return an empty reference from a successful
/// insert, and must fail a replace of an unknown reference with
/// [`ProviderError::NotFound`] unless they document upsert semantics.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Store a new event, returning its reference.
    async fn insert_event(&self, event: &AuditEvent) -> ProviderResult<EventReference>;

    /// Overwrite the event stored under `reference`.
    async fn replace_event(
        &self,
        reference: &EventReference,
        event: &AuditEvent,
    ) -> ProviderResult<()>;
}

#[async_trait]
impl<P: DataProvider + ?Sized> DataProvider for Arc<P> {
    async fn insert_event(&self, event: &AuditEvent) -> ProviderResult<EventReference> {
        (**self).insert_event(event).await
    }

    async fn replace_event(
        &self,
        reference: &EventReference,
        event: &AuditEvent,
    ) -> ProviderResult<()> {
        (**self).replace_event(reference, event).await
    }
}

/// Blocking counterpart of [`DataProvider`].
pub trait SyncDataProvider: Send + Sync + 'static {
    /// Store a new event, returning its reference.
    fn insert_event(&self, event: &AuditEvent) -> ProviderResult<EventReference>;

    /// Overwrite the event stored under `reference`.
    fn replace_event(&self, reference: &EventReference, event: &AuditEvent)
        -> ProviderResult<()>;
}

/// Adapts a [`SyncDataProvider`] to the async [`DataProvider`] trait.
///
/// Each call receives its own copy of the event and runs on
/// `tokio::task::spawn_blocking`, so a tokio runtime must be active.
pub struct BlockingProvider<P> {
    inner: Arc<P>,
}

impl<P: SyncDataProvider> BlockingProvider<P> {
    /// Wrap a synchronous provider.
    pub fn new(provider: P) -> Self {
        Self {
            inner: Arc::new(provider),
        }
    }

    /// Access the wrapped provider.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P> Clone for BlockingProvider<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl<P: SyncDataProvider> DataProvider for BlockingProvider<P> {
    async fn insert_event(&self, event: &AuditEvent) -> ProviderResult<EventReference> {
        let inner = Arc::clone(&self.inner);
        let event = event.clone();
        tokio::task::spawn_blocking(move || inner.insert_event(&event))
            .await
            .map_err(|e| ProviderError::Backend(format!("Blocking insert task failed: {}", e)))?
    }

    async fn replace_event(
        &self,
        reference: &EventReference,
        event: &AuditEvent,
    ) -> ProviderResult<()> {
        let inner = Arc::clone(&self.inner);
        let reference = reference.clone();
        let event = event.clone();
        tokio::task::spawn_blocking(move || inner.replace_event(&reference, &event))
            .await
            .map_err(|e| ProviderError::Backend(format!("Blocking replace task failed: {}", e)))?
    }
}
