//! RPC server subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum serve loop, graceful stop)
//!     → request id layers (x-request-id set + propagated)
//!     → in-flight tracking
//!     → interceptor.rs (ordered wrap functions, unary or streaming)
//!     → RpcService routes (`POST /<service>/<method>`)
//!     → status.rs (errors as `RpcStatus` envelopes)
//! ```
//!
//! # Design Decisions
//! - Calls are JSON over HTTP; the method path follows `/<service>/<method>`
//! - Interceptors are composed once at construction, never per call
//! - Services register unary and streaming methods separately so each gets
//!   its own interceptor

use axum::Router;
use serde::de::DeserializeOwned;

pub mod interceptor;
pub mod reflection;
pub mod server;
pub mod status;

pub use interceptor::{CallKind, InFlight, Interceptor, InterceptorChain, InterceptorPair};
pub use reflection::ReflectionService;
pub use server::{RpcServer, RpcServerBuilder};
pub use status::{Code, RpcStatus, GRPC_STATUS_HEADER};

/// Registration contract for everything mounted on the RPC server.
///
/// Business handlers implement this; the server only needs their name and
/// routes. The name doubles as the key reported by the health service.
pub trait RpcService: Send + Sync + 'static {
    /// Fully qualified service name, e.g. `grpc.health.v1.Health`.
    fn name(&self) -> &str;

    /// Request/response methods.
    fn unary_routes(&self) -> Router;

    /// Server-streaming methods.
    fn streaming_routes(&self) -> Router {
        Router::new()
    }
}

/// `/<service>/<method>`
pub fn method_path(service: &str, method: &str) -> String {
    format!("/{service}/{method}")
}

/// Decode a JSON request body. An empty body decodes as `T::default()`.
pub fn decode_request<T>(body: &[u8]) -> Result<T, RpcStatus>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| RpcStatus::invalid_argument(format!("malformed request: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Probe {
        #[serde(default)]
        service: String,
    }

    #[test]
    fn method_paths() {
        assert_eq!(
            method_path("grpc.health.v1.Health", "Check"),
            "/grpc.health.v1.Health/Check"
        );
    }

    #[test]
    fn empty_body_decodes_to_default() {
        let probe: Probe = decode_request(b"").unwrap();
        assert_eq!(probe, Probe::default());
        let probe: Probe = decode_request(b"  \n").unwrap();
        assert_eq!(probe, Probe::default());
    }

    #[test]
    fn malformed_body_is_invalid_argument() {
        let err = decode_request::<Probe>(b"{not json").unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }
}
