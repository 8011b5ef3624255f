//! The concurrent function-summary store.

use crate::il::FunctionId;
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// A concurrent map from function to summary, with change tracking.
///
/// The registry is the only resource shared between the worker threads of an
/// interprocedural pass, so updates are per-key read-modify-write operations
/// on a striped map, never a single global lock. A summary is created on
/// first access, mutated only by its own function's analysis, and never
/// deleted during a run.
///
/// The dirty flag answers "did any summary change since the last
/// `materialize_update`?" — the interprocedural analyzer's convergence test.
#[derive(Debug, Default)]
pub struct SummaryRegistry<S> {
    map: DashMap<FunctionId, S>,
    dirty: AtomicBool,
}

impl<S: Clone> SummaryRegistry<S> {
    pub fn new() -> SummaryRegistry<S> {
        SummaryRegistry {
            map: DashMap::new(),
            dirty: AtomicBool::new(false),
        }
    }

    /// The summary of `function`, or `default` if none has been recorded.
    pub fn get(&self, function: FunctionId, default: S) -> S {
        self.map
            .get(&function)
            .map(|summary| summary.clone())
            .unwrap_or(default)
    }

    /// Update the summary of `function` under its key's lock. The entry is
    /// created from `default` on first access; `updater` returns whether it
    /// changed the value, and any change marks the registry dirty.
    pub fn maybe_update<F>(&self, function: FunctionId, default: S, updater: F)
    where
        F: FnOnce(&mut S) -> bool,
    {
        let mut entry = self.map.entry(function).or_insert(default);
        if updater(entry.value_mut()) {
            self.dirty.store(true, Ordering::Release);
        }
    }

    /// Whether any summary changed since the last `materialize_update`.
    pub fn has_update(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Reset change tracking at the start of a pass.
    pub fn materialize_update(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// A point-in-time copy of every recorded summary. Not thread-safe with
    /// respect to concurrent updates; call between passes or after the run.
    pub fn snapshot(&self) -> FxHashMap<FunctionId, S> {
        self.map
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_query_creates_the_entry() {
        let registry: SummaryRegistry<u32> = SummaryRegistry::new();
        assert_eq!(registry.get(FunctionId(0), 42), 42);
        assert!(registry.is_empty());
        registry.maybe_update(FunctionId(0), 42, |_| false);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(FunctionId(0), 0), 42);
    }

    #[test]
    fn changes_mark_the_registry_dirty() {
        let registry: SummaryRegistry<u32> = SummaryRegistry::new();
        registry.maybe_update(FunctionId(0), 0, |_| false);
        assert!(!registry.has_update());
        registry.maybe_update(FunctionId(0), 0, |value| {
            *value = 7;
            true
        });
        assert!(registry.has_update());
        registry.materialize_update();
        assert!(!registry.has_update());
        assert_eq!(registry.get(FunctionId(0), 0), 7);
    }

    #[test]
    fn concurrent_updates_target_distinct_keys() {
        use std::sync::Arc;
        let registry: Arc<SummaryRegistry<usize>> = Arc::new(SummaryRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry.maybe_update(FunctionId(i), 0, |value| {
                        *value = i;
                        true
                    });
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 8);
        for i in 0..8 {
            assert_eq!(registry.get(FunctionId(i), usize::MAX), i);
        }
        assert!(registry.has_update());
    }
}
