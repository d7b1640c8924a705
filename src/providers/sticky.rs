use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::{debug, error};

use super::{FailureKind, ProviderError};

/// Ordered sub-list (model variants, API keys) inside a single provider.
///
/// Same fallback shape as the orchestrator, one level down: the entry that
/// last worked is tried first, then the rest in configured order. Entries
/// that no longer exist upstream are retired for the rest of the run.
#[derive(Debug)]
pub struct StickyList<T> {
    items: Vec<T>,
    current: AtomicUsize,
    retired: Vec<AtomicBool>,
}

impl<T> StickyList<T> {
    pub fn new(items: Vec<T>) -> Self {
        let retired = items.iter().map(|_| AtomicBool::new(false)).collect();
        Self {
            items,
            current: AtomicUsize::new(0),
            retired,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current(&self) -> Option<&T> {
        self.items.get(self.current.load(Ordering::Relaxed))
    }

    /// Attempt order: remembered entry first, remaining entries in order.
    /// Retired entries are left out.
    pub fn order(&self) -> Vec<(usize, &T)> {
        let current = self.current.load(Ordering::Relaxed);
        let mut order = Vec::with_capacity(self.items.len());
        if let Some(item) = self.items.get(current) {
            order.push((current, item));
        }
        order.extend(
            self.items
                .iter()
                .enumerate()
                .filter(|(idx, _)| *idx != current),
        );
        order.retain(|(idx, _)| !self.is_retired(*idx));
        order
    }

    pub fn is_retired(&self, idx: usize) -> bool {
        self.retired
            .get(idx)
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub fn retire(&self, idx: usize) {
        if let Some(flag) = self.retired.get(idx) {
            flag.store(true, Ordering::Relaxed);
        }
    }

    pub fn remember(&self, idx: usize) {
        if idx < self.items.len() {
            self.current.store(idx, Ordering::Relaxed);
        }
    }
}

impl<T: std::fmt::Display> StickyList<T> {
    /// Log a failed entry. One whose model or endpoint no longer exists is
    /// reported at error level and retired.
    pub(crate) fn record_failure(&self, provider: &str, idx: usize, err: &ProviderError) {
        let Some(entry) = self.items.get(idx) else {
            return;
        };
        if err.kind.is_stale_config() {
            error!(
                provider,
                entry = %entry,
                error = %err,
                "configured entry no longer exists upstream, skipping it for the rest of the run"
            );
            self.retire(idx);
        } else {
            debug!(provider, entry = %entry, error = %err, "entry failed");
        }
    }
}

/// Collapse the failures of a whole sub-list into one error. A single-entry
/// list surfaces its error unchanged so the orchestrator classifies the real
/// cause.
pub(crate) fn exhausted(provider: &str, attempts: usize, last: Option<ProviderError>) -> ProviderError {
    match last {
        Some(err) if attempts == 1 => err,
        Some(err) => ProviderError::new(
            FailureKind::Exhausted,
            format!("{provider}: all {attempts} variants exhausted, last: {err}"),
        ),
        // Every entry was retired as removed upstream.
        None => ProviderError::new(
            FailureKind::NotFoundOrRemoved,
            format!("{provider}: no configured entry is still available"),
        ),
    }
}
