//! Scope registry
//!
//! Associates the active [`AuditScope`] of an operation with a caller-supplied
//! context key (typically a request id), so code deeper in the call chain can
//! retrieve it. Independent keys never contend on a single lock.

use crate::scope::AuditScope;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A scope shared between the registry and the code running the operation.
pub type SharedScope = Arc<Mutex<AuditScope>>;

/// Concurrent map from context key to active audit scope.
///
/// Holds at most one scope per key. Attaching a second scope under a key
/// replaces the association *without* ending the displaced scope: the caller
/// must end or discard it first. [`attach`](Self::attach) hands the displaced
/// scope back so it is not silently lost.
pub struct ScopeRegistry<K = String>
where
    K: Eq + Hash,
{
    scopes: DashMap<K, SharedScope>,
}

impl<K> ScopeRegistry<K>
where
    K: Eq + Hash,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            scopes: DashMap::new(),
        }
    }

    /// Attach `scope` to `key`, returning the shared handle and the scope it
    /// displaced, if any.
    pub fn attach(&self, key: K, scope: AuditScope) -> (SharedScope, Option<SharedScope>) {
        let shared = Arc::new(Mutex::new(scope));
        let previous = self.attach_shared(key, Arc::clone(&shared));
        (shared, previous)
    }

    /// Attach an already shared scope to `key`, returning the displaced one.
    pub fn attach_shared(&self, key: K, scope: SharedScope) -> Option<SharedScope> {
        let previous = self.scopes.insert(key, scope);
        if previous.is_some() {
            tracing::warn!("Audit scope replaced in registry; the previous scope was not ended");
        }
        previous
    }

    /// Attach `scope` to `key` unless another scope holds the key. Hands the
    /// scope back when the key is taken.
    pub fn attach_vacant(&self, key: K, scope: SharedScope) -> Result<(), SharedScope> {
        match self.scopes.entry(key) {
            Entry::Occupied(_) => Err(scope),
            Entry::Vacant(entry) => {
                entry.insert(scope);
                Ok(())
            }
        }
    }

    /// The scope attached to `key`.
    pub fn retrieve(&self, key: &K) -> Option<SharedScope> {
        self.scopes.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove and return the scope attached to `key`.
    pub fn detach(&self, key: &K) -> Option<SharedScope> {
        self.scopes.remove(key).map(|(_, scope)| scope)
    }

    /// Whether a scope is attached to `key`.
    pub fn contains(&self, key: &K) -> bool {
        self.scopes.contains_key(key)
    }

    /// Number of attached scopes.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Whether no scope is attached.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl<K> Default for ScopeRegistry<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for ScopeRegistry<K>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("len", &self.scopes.len())
            .finish()
    }
}
