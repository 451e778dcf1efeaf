//! Per-key resolution slots shared by both serializer caches.

use crate::serializer::SharedSerializer;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Outcome of a finished resolution: a serializer, or a clean "none exists".
type Resolved = Option<SharedSerializer>;

/// `None` until the first successful resolution; a failed attempt leaves it `None`.
type Slot = Arc<Mutex<Option<Resolved>>>;

/// Where a key stands in its resolution lifecycle.
///
/// `Unresolved → Resolving → Cached | CachedAbsent`. A failed attempt is reported to its caller
/// and the key returns to `Unresolved`, so the next lookup tries again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Unresolved,
    Resolving,
    Cached,
    CachedAbsent,
}

/// Lazily populated, never evicted map from key to resolution outcome.
///
/// The map's shard lock is only held to fetch or insert a slot. The slot's own mutex
/// serialises resolution per key: one caller runs the resolver, concurrent callers for the same
/// key wait and then observe its outcome. The resolver must not look up its own key.
pub(crate) struct ResolutionCache<K> {
    slots: DashMap<K, Slot, ahash::RandomState>,
}

impl<K> ResolutionCache<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    pub(crate) fn new() -> Self {
        Self {
            slots: DashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    pub(crate) fn get_or_resolve<E, F>(&self, key: &K, resolve: F) -> Result<Resolved, E>
    where
        F: FnOnce() -> Result<Resolved, E>,
    {
        let slot = self.slot(key);
        let mut outcome = slot.lock();
        if let Some(resolved) = outcome.as_ref() {
            tracing::trace!(?key, found = resolved.is_some(), "serializer cache hit");
            return Ok(resolved.clone());
        }
        let resolved = resolve()?;
        *outcome = Some(resolved.clone());
        Ok(resolved)
    }

    pub(crate) fn state(&self, key: &K) -> ResolutionState {
        let Some(slot) = self.slots.get(key).map(|slot| Arc::clone(slot.value())) else {
            return ResolutionState::Unresolved;
        };
        let Some(outcome) = slot.try_lock() else {
            return ResolutionState::Resolving;
        };
        match outcome.as_ref() {
            None => ResolutionState::Unresolved,
            Some(Some(_)) => ResolutionState::Cached,
            Some(None) => ResolutionState::CachedAbsent,
        }
    }

    /// Number of keys with a finished outcome.
    pub(crate) fn resolved_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().try_lock().is_some_and(|outcome| outcome.is_some()))
            .count()
    }

    fn slot(&self, key: &K) -> Slot {
        // The read guard must be released before `entry` takes the shard's write lock.
        let existing = self.slots.get(key).map(|slot| Arc::clone(slot.value()));
        match existing {
            Some(slot) => slot,
            None => Arc::clone(self.slots.entry(key.clone()).or_default().value()),
        }
    }
}

impl<K: Eq + Hash> fmt::Debug for ResolutionCache<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("slots", &self.slots.len())
            .finish()
    }
}
