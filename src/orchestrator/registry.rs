use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::capability::CapabilityClass;
use crate::providers::Provider;

/// One provider registered for one capability class.
///
/// `enabled` is fixed at construction. `failed` only ever moves from false
/// to true, and only the orchestrator can move it.
pub struct ProviderSlot {
    key: String,
    display_name: String,
    class: CapabilityClass,
    enabled: bool,
    failed: bool,
    provider: Arc<dyn Provider>,
}

impl fmt::Debug for ProviderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSlot")
            .field("key", &self.key)
            .field("class", &self.class)
            .field("enabled", &self.enabled)
            .field("failed", &self.failed)
            .finish()
    }
}

impl ProviderSlot {
    pub fn new(
        key: impl Into<String>,
        display_name: impl Into<String>,
        class: CapabilityClass,
        enabled: bool,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            class,
            enabled,
            failed: false,
            provider,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn class(&self) -> CapabilityClass {
        self.class
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_eligible(&self) -> bool {
        self.enabled && !self.failed
    }

    pub(super) fn provider(&self) -> Arc<dyn Provider> {
        Arc::clone(&self.provider)
    }

    pub(super) fn bench(&mut self) {
        self.failed = true;
    }
}

/// Fixed-priority slots for one class plus the Run State pointer.
#[derive(Debug, Default)]
pub(super) struct Roster {
    pub(super) slots: Vec<ProviderSlot>,
    pub(super) current: Option<usize>,
}

impl Roster {
    /// Configured order, with the current slot moved to the front when it is
    /// still eligible.
    pub(super) fn candidate_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.slots.len()).collect();
        let sticky = self
            .current
            .filter(|idx| self.slots.get(*idx).is_some_and(ProviderSlot::is_eligible));
        if let Some(current) = sticky {
            order.retain(|idx| *idx != current);
            order.insert(0, current);
        }
        order
    }
}

/// Ordered provider rosters, one per capability class.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    pub(super) rosters: BTreeMap<CapabilityClass, Roster>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot to its class roster (lowest priority so far).
    pub fn register(&mut self, slot: ProviderSlot) {
        self.rosters.entry(slot.class).or_default().slots.push(slot);
    }

    pub fn slots(&self, class: CapabilityClass) -> &[ProviderSlot] {
        self.rosters
            .get(&class)
            .map(|r| r.slots.as_slice())
            .unwrap_or_default()
    }

    pub fn slot(&self, class: CapabilityClass, key: &str) -> Option<&ProviderSlot> {
        self.slots(class).iter().find(|s| s.key == key)
    }

    pub fn current(&self, class: CapabilityClass) -> Option<&ProviderSlot> {
        let roster = self.rosters.get(&class)?;
        roster.current.and_then(|idx| roster.slots.get(idx))
    }

    pub fn has_eligible(&self, class: CapabilityClass) -> bool {
        self.slots(class).iter().any(ProviderSlot::is_eligible)
    }
}
