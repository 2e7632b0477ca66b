//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Observability → metrics endpoint → health registration
//!     → RPC server with interceptors → bind listener
//!
//! Run (orchestrator.rs):
//!     spawn serve loop → mark SERVING → wait for signal or serve exit
//!
//! Shutdown (orchestrator.rs, shutdown.rs):
//!     NOT_SERVING → stop accepting → drain in-flight (bounded)
//!     → stop metrics endpoint → release observability handles
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → ShutdownSignal channel
//! ```
//!
//! # Design Decisions
//! - Ordered startup: observability first, listener last
//! - Ordered shutdown: health first, observability last
//! - The drain has a deadline; a second signal cuts it short

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::config::{ConfigError, ServiceKind};
use crate::net::ListenerError;
use crate::observability::ObservabilityError;

pub mod orchestrator;
pub mod shutdown;
pub mod signals;
pub(crate) mod startup;

pub use orchestrator::Orchestrator;
pub use shutdown::{Shutdown, ShutdownSignal};

/// Published by the orchestrator as it moves through its run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecyclePhase {
    Starting,
    Serving { addr: SocketAddr },
    Draining,
    Stopped,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("observability initialization failed: {0}")]
    Init(#[from] ObservabilityError),

    #[error("listener error: {0}")]
    Bind(#[from] ListenerError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("server exited without a shutdown request")]
    ServeExited,

    #[error("server task failed: {0}")]
    ServeTaskFailed(String),

    #[error("drain did not finish within {timeout:?}")]
    DrainTimeout { timeout: Duration },

    #[error("forced shutdown by second {signal}")]
    ForcedShutdown { signal: ShutdownSignal },
}

impl LifecycleError {
    /// Name of the lifecycle step that failed.
    pub fn step(&self) -> &'static str {
        match self {
            LifecycleError::Config(_) => "config",
            LifecycleError::Init(_) => "observability",
            LifecycleError::Bind(_) => "listen",
            LifecycleError::Signals(_) => "signals",
            LifecycleError::Serve(_)
            | LifecycleError::ServeExited
            | LifecycleError::ServeTaskFailed(_) => "serve",
            LifecycleError::DrainTimeout { .. } | LifecycleError::ForcedShutdown { .. } => "drain",
        }
    }

    /// Every fatal failure exits with 1.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// Wrap a configuration failure for `kind` and log it with the same fields
/// as any other fatal lifecycle error.
pub fn config_failure(kind: ServiceKind, err: ConfigError) -> LifecycleError {
    let environment = err.environment().unwrap_or("unknown").to_string();
    let err = LifecycleError::Config(err);
    tracing::error!(
        service = kind.default_name(),
        environment = %environment,
        step = err.step(),
        error = %err,
        "Service failed"
    );
    err
}

/// Process exit code for a finished run.
pub fn exit_code(result: &Result<(), LifecycleError>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(e) => e.exit_code(),
    }
}
