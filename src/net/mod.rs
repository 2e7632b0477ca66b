//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! PORT from ServiceConfig
//!     → listener.rs (bind 0.0.0.0:PORT)
//!     → RpcServer::serve (accept loop)
//! ```
//!
//! # Design Decisions
//! - Binding happens before the serve task is spawned so a busy port is a
//!   startup failure, not a background one
//! - Port 0 asks the OS for a free port; the bound address is reported back

pub mod listener;

pub use listener::{bind, ListenerError};
