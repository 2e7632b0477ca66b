//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env override file (optional, key=value)
//!     → loader.rs (in-memory layer, never written to the process env)
//! process environment
//!     → loader.rs (typed lookups with defaults, env wins over file)
//!     → validation.rs (production safety checks)
//!     → ServiceConfig (validated, immutable)
//!     → owned by the orchestrator, lent by reference
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - Every field has a documented default, parse failures fall back to it
//! - Only deterministic misconfiguration is an error

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, ConfigError, ConfigLoader};
pub use schema::{
    AuthConfig, CacheConfig, DatabaseConfig, FeatureFlags, LogFormat, LogLevel,
    ObservabilityConfig, Secret, ServiceConfig, ServiceKind, PLACEHOLDER_JWT_SECRET,
};
