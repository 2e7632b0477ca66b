//! Per-service serving-status store.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

use crate::health::state::{HealthError, ServingStatus};

/// Keyed serving-status store shared between the orchestrator (writer) and
/// health callers (readers).
///
/// Statuses only move forward. Once [`HealthRegistry::shutdown`] has run,
/// nothing can report `SERVING` again.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    statuses: DashMap<String, ServingStatus>,
    shutting_down: AtomicBool,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `service` with status `UNKNOWN` if it is not tracked yet.
    pub fn register(&self, service: &str) {
        self.statuses.entry(service.to_string()).or_default();
    }

    pub fn set_serving(&self, service: &str) -> Result<(), HealthError> {
        self.transition(service, ServingStatus::Serving)
    }

    pub fn set_not_serving(&self, service: &str) -> Result<(), HealthError> {
        self.transition(service, ServingStatus::NotServing)
    }

    fn transition(&self, service: &str, next: ServingStatus) -> Result<(), HealthError> {
        let mut entry = self.statuses.entry(service.to_string()).or_default();
        let current = *entry;

        // Checked under the entry lock: shutdown() raises the flag before it
        // walks the shards.
        let frozen = next == ServingStatus::Serving && self.shutting_down.load(Ordering::SeqCst);
        if frozen || !current.can_transition_to(next) {
            return Err(HealthError::InvalidTransition {
                service: service.to_string(),
                from: if frozen { ServingStatus::NotServing } else { current },
                to: next,
            });
        }

        if current != next {
            tracing::info!(service = %service, from = %current, to = %next, "Serving status changed");
        }
        *entry = next;
        Ok(())
    }

    /// Mark every tracked service `NOT_SERVING` and refuse later `SERVING`
    /// transitions. Returns the affected service names.
    pub fn shutdown(&self) -> Vec<String> {
        self.shutting_down.store(true, Ordering::SeqCst);

        let mut names = Vec::with_capacity(self.statuses.len());
        for mut entry in self.statuses.iter_mut() {
            *entry.value_mut() = ServingStatus::NotServing;
            names.push(entry.key().clone());
        }
        names.sort();

        tracing::info!(services = ?names, "All services marked NOT_SERVING");
        names
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Current status; `UNKNOWN` for names never registered. Never blocks on
    /// writers to other services.
    pub fn check(&self, service: &str) -> ServingStatus {
        self.statuses
            .get(service)
            .map(|status| *status)
            .unwrap_or_default()
    }

    /// Push-based status streams are not provided by this layer.
    pub fn watch(&self, service: &str) -> Result<Infallible, HealthError> {
        tracing::debug!(service = %service, "Health watch requested");
        Err(HealthError::Unsupported)
    }

    /// Snapshot of all tracked services, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, ServingStatus)> {
        let mut all: Vec<(String, ServingStatus)> = self
            .statuses
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
