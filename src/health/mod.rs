//! Health reporting subsystem.
//!
//! # Data Flow
//! ```text
//! Orchestrator (single writer):
//!     register → set_serving → shutdown
//!     → registry.rs (DashMap keyed by service name)
//!
//! Health callers (many readers):
//!     POST /grpc.health.v1.Health/Check
//!     → service.rs → registry.check()
//!
//!     POST /grpc.health.v1.Health/Watch
//!     → UNIMPLEMENTED
//! ```
//!
//! # Design Decisions
//! - state.rs owns the transition rules, registry.rs enforces them
//! - No mutable references escape the registry
//! - The empty name `""` stands for the whole server

pub mod registry;
pub mod service;
pub mod state;

pub use registry::HealthRegistry;
pub use service::{HealthCheckRequest, HealthCheckResponse, HealthService};
pub use state::{HealthError, ServingStatus};
