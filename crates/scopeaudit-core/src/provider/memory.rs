//! In-memory data provider implementation

use super::{DataProvider, EventReference};
use crate::error::{ProviderError, ProviderResult};
use crate::event::AuditEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

/// In-memory data provider (for development/testing).
///
/// References are random UUIDs. Replacing an unknown reference fails with
/// [`ProviderError::NotFound`]; there is no upsert. Every successful insert and
/// replace is counted so callers can check how a creation policy wrote.
#[derive(Debug, Default)]
pub struct InMemoryDataProvider {
    events: RwLock<HashMap<EventReference, AuditEvent>>,
    order: RwLock<Vec<EventReference>>,
    inserts: AtomicUsize,
    replaces: AtomicUsize,
}

impl InMemoryDataProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the event stored under `reference`.
    pub fn get(&self, reference: &EventReference) -> ProviderResult<Option<AuditEvent>> {
        let events = self
            .events
            .read()
            .map_err(|e| ProviderError::Backend(format!("Failed to acquire lock: {}", e)))?;

        Ok(events.get(reference).cloned())
    }

    /// All stored events in insertion order.
    pub fn events(&self) -> ProviderResult<Vec<AuditEvent>> {
        let events = self
            .events
            .read()
            .map_err(|e| ProviderError::Backend(format!("Failed to acquire lock: {}", e)))?;
        let order = self
            .order
            .read()
            .map_err(|e| ProviderError::Backend(format!("Failed to acquire lock: {}", e)))?;

        Ok(order.iter().filter_map(|r| events.get(r).cloned()).collect())
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.read().map(|events| events.len()).unwrap_or(0)
    }

    /// Whether no event is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful inserts since creation or the last [`clear`](Self::clear).
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Number of successful replaces since creation or the last [`clear`](Self::clear).
    pub fn replace_count(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    /// Remove all events and reset the counters.
    pub fn clear(&self) -> ProviderResult<()> {
        let mut events = self
            .events
            .write()
            .map_err(|e| ProviderError::Backend(format!("Failed to acquire lock: {}", e)))?;
        let mut order = self
            .order
            .write()
            .map_err(|e| ProviderError::Backend(format!("Failed to acquire lock: {}", e)))?;

        events.clear();
        order.clear();
        self.inserts.store(0, Ordering::SeqCst);
        self.replaces.store(0, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl DataProvider for InMemoryDataProvider {
    async fn insert_event(&self, event: &AuditEvent) -> ProviderResult<EventReference> {
        let reference = EventReference::new(Uuid::new_v4().to_string());

        let mut events = self
            .events
            .write()
            .map_err(|e| ProviderError::Backend(format!("Failed to acquire lock: {}", e)))?;
        let mut order = self
            .order
            .write()
            .map_err(|e| ProviderError::Backend(format!("Failed to acquire lock: {}", e)))?;

        events.insert(reference.clone(), event.clone());
        order.push(reference.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(reference)
    }

    async fn replace_event(
        &self,
        reference: &EventReference,
        event: &AuditEvent,
    ) -> ProviderResult<()> {
        let mut events = self
            .events
            .write()
            .map_err(|e| ProviderError::Backend(format!("Failed to acquire lock: {}", e)))?;

        let slot = events
            .get_mut(reference)
            .ok_or_else(|| ProviderError::NotFound(reference.clone()))?;
        *slot = event.clone();
        self.replaces.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
