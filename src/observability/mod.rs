//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     init_logging  → global tracing subscriber (json | text)
//!     init_tracing  → TracerProvider
//!     init_metrics  → MeterProvider (own Prometheus recorder)
//!
//! Per call:
//!     interceptor.rs → span + rpc_server_* metrics
//!
//! Scrape:
//!     GET /metrics on PROMETHEUS_PORT → MeterProvider::render
//! ```
//!
//! # Design Decisions
//! - No global providers; the orchestrator owns the handles
//! - Handles are released exactly once, after the server has stopped

use thiserror::Error;

pub mod interceptor;
pub mod logging;
pub mod metrics;
pub mod tracing;

pub use self::interceptor::trace_interceptors;
pub use self::logging::{init_logging, LogGuard};
pub use self::metrics::{init_metrics, start_metrics_server, MeterProvider, MetricsServer};
pub use self::tracing::{init_tracing, TracerProvider};

use crate::rpc::InterceptorPair;

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("failed to initialize {component}: {reason}")]
    Init {
        component: &'static str,
        reason: String,
    },

    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

/// Tracer and meter for one service, torn down together.
#[derive(Debug)]
pub struct ObservabilityHandles {
    tracer: TracerProvider,
    meter: MeterProvider,
}

impl ObservabilityHandles {
    pub fn init(service_name: &str) -> Result<Self, ObservabilityError> {
        let tracer = init_tracing(service_name)?;
        let meter = init_metrics(service_name)?;
        ::tracing::info!(service = %service_name, "Observability initialized");
        Ok(Self { tracer, meter })
    }

    pub fn tracer(&self) -> &TracerProvider {
        &self.tracer
    }

    pub fn meter(&self) -> &MeterProvider {
        &self.meter
    }

    pub fn interceptors(&self) -> InterceptorPair {
        trace_interceptors(&self.tracer, &self.meter)
    }

    /// Flush and stop both providers. Consumes the handles so this can only
    /// happen once.
    pub fn shutdown(self) {
        self.tracer.shutdown();
        self.meter.shutdown();
        ::tracing::info!(service = %self.tracer.service_name(), "Observability shut down");
    }
}
