//! Shared lifecycle runtime for the service family.
//!
//! Every service (auth, bidding, procurement, notification, audit, gateway)
//! runs the same sequence: load configuration, bring up observability,
//! register health, serve RPCs, drain on a termination signal.

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod rpc;

pub use config::{ConfigLoader, ServiceConfig, ServiceKind};
pub use health::{HealthRegistry, ServingStatus};
pub use lifecycle::{LifecycleError, LifecyclePhase, Orchestrator, ShutdownSignal};
pub use rpc::{RpcServer, RpcService, RpcStatus};
