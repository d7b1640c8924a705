pub mod registry;

use std::collections::BTreeMap;

use tracing::{debug, error, info, warn};

use crate::capability::CapabilityClass;
use crate::error::{Result, StocklensError};
use crate::providers::TaskRequest;
use registry::ProviderRegistry;

/// Raw text answer plus the key of the provider that produced it. Parsing
/// into domain records is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub text: String,
    pub provider: String,
}

/// Multi-provider fallback orchestrator.
///
/// Owns the provider registry and the per-class Run State. All calls are
/// sequential: `execute` takes `&mut self` and tries candidates one at a
/// time.
#[derive(Debug)]
pub struct Orchestrator {
    registry: ProviderRegistry,
}

impl Orchestrator {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn current_provider(&self, class: CapabilityClass) -> Option<&str> {
        self.registry.current(class).map(|s| s.key())
    }

    /// Provider that most recently succeeded, per class that has one.
    pub fn current_providers(&self) -> BTreeMap<CapabilityClass, String> {
        CapabilityClass::ALL
            .into_iter()
            .filter_map(|class| {
                self.current_provider(class)
                    .map(|key| (class, key.to_owned()))
            })
            .collect()
    }

    /// Run `request` on the first eligible provider for `class` that succeeds.
    ///
    /// Candidate order is the configured priority with the current provider
    /// (if still eligible) moved to the front. Disabled and benched providers
    /// are never invoked. A failure whose kind benches marks the provider
    /// failed for the rest of the run; every failure moves on to the next
    /// candidate. Only running out of candidates is an error.
    pub async fn execute(
        &mut self,
        class: CapabilityClass,
        context: &str,
        request: &TaskRequest,
    ) -> Result<TaskResult> {
        let exhausted = || StocklensError::Exhausted {
            context: context.to_owned(),
            class,
        };
        let Some(roster) = self.registry.rosters.get_mut(&class) else {
            warn!(context, %class, "no providers registered");
            return Err(exhausted());
        };

        for idx in roster.candidate_order() {
            let slot = &roster.slots[idx];
            if !slot.is_eligible() {
                debug!(
                    context,
                    %class,
                    provider = slot.key(),
                    enabled = slot.is_enabled(),
                    failed = slot.is_failed(),
                    "skipping provider"
                );
                continue;
            }
            let key = slot.key().to_owned();
            let display_name = slot.display_name().to_owned();
            let provider = slot.provider();

            info!(context, %class, provider = %key, "trying {display_name}");
            match provider.invoke(request).await {
                Ok(text) => {
                    if roster.current != Some(idx) {
                        info!(%class, provider = %key, "switching to {display_name} for subsequent requests");
                        roster.current = Some(idx);
                    }
                    return Ok(TaskResult {
                        text,
                        provider: key,
                    });
                }
                Err(err) => {
                    warn!(context, %class, provider = %key, kind = %err.kind, error = %err.message, "provider failed");
                    if err.kind.benches() {
                        roster.slots[idx].bench();
                        if err.kind.is_stale_config() {
                            error!(
                                %class,
                                provider = %key,
                                "{display_name} benched for this run: configured model or endpoint no longer exists"
                            );
                        } else {
                            warn!(%class, provider = %key, "{display_name} benched for this run");
                        }
                    }
                }
            }
        }

        Err(exhausted())
    }
}
