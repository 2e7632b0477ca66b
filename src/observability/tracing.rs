//! Span creation for inbound RPC calls.
//!
//! The provider is an explicit handle, never a global. Spans are ordinary
//! `tracing` spans, so whichever subscriber is installed decides where they
//! go. Exporting to a collector is left to that subscriber.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::Span;

use crate::observability::ObservabilityError;
use crate::rpc::CallKind;

#[derive(Debug)]
struct Inner {
    service_name: String,
    spans_started: AtomicU64,
    shut_down: AtomicBool,
}

/// Cheap to clone; all clones share one lifecycle.
#[derive(Debug, Clone)]
pub struct TracerProvider {
    inner: Arc<Inner>,
}

/// Build the tracer provider for `service_name`.
pub fn init_tracing(service_name: &str) -> Result<TracerProvider, ObservabilityError> {
    if service_name.trim().is_empty() {
        return Err(ObservabilityError::Init {
            component: "tracer",
            reason: "service name is empty".to_string(),
        });
    }

    tracing::debug!(service = %service_name, "Tracer provider initialized");
    Ok(TracerProvider {
        inner: Arc::new(Inner {
            service_name: service_name.to_string(),
            spans_started: AtomicU64::new(0),
            shut_down: AtomicBool::new(false),
        }),
    })
}

impl TracerProvider {
    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    /// Open a span for one call. Returns `None` once the provider is shut
    /// down.
    ///
    /// The `rpc.code` field is left empty for the caller to record when the
    /// response is known.
    pub fn start_span(&self, kind: CallKind, method: &str, request_id: &str) -> Option<Span> {
        if self.is_shut_down() {
            return None;
        }
        self.inner.spans_started.fetch_add(1, Ordering::Relaxed);

        Some(tracing::info_span!(
            "rpc.call",
            service = %self.inner.service_name,
            rpc.method = %method,
            rpc.kind = %kind,
            request_id = %request_id,
            rpc.code = tracing::field::Empty,
        ))
    }

    pub fn spans_started(&self) -> u64 {
        self.inner.spans_started.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Stop producing spans. Returns `false` if already shut down.
    pub fn shutdown(&self) -> bool {
        let first = !self.inner.shut_down.swap(true, Ordering::SeqCst);
        if first {
            tracing::debug!(
                service = %self.inner.service_name,
                spans = self.spans_started(),
                "Tracer provider shut down"
            );
        }
        first
    }
}
