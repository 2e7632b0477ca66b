//! Health RPC service.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::health::registry::HealthRegistry;
use crate::health::state::ServingStatus;
use crate::observability::MeterProvider;
use crate::rpc::{decode_request, method_path, RpcService, RpcStatus};

pub const SERVICE_NAME: &str = "grpc.health.v1.Health";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckRequest {
    /// Service to query; empty means the whole server.
    #[serde(default)]
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: ServingStatus,
}

/// Serves `Check` from the registry. `Watch` is mounted as a streaming
/// method but always answers `UNIMPLEMENTED`.
#[derive(Debug, Clone)]
pub struct HealthService {
    registry: Arc<HealthRegistry>,
    meter: Option<MeterProvider>,
}

impl HealthService {
    pub fn new(registry: Arc<HealthRegistry>) -> Self {
        Self {
            registry,
            meter: None,
        }
    }

    /// Count every `Check` in `health_checks_total`.
    pub fn with_meter(mut self, meter: MeterProvider) -> Self {
        self.meter = Some(meter);
        self
    }
}

impl RpcService for HealthService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    fn unary_routes(&self) -> Router {
        Router::new()
            .route(&method_path(SERVICE_NAME, "Check"), post(check))
            .with_state(self.clone())
    }

    fn streaming_routes(&self) -> Router {
        Router::new()
            .route(&method_path(SERVICE_NAME, "Watch"), post(watch))
            .with_state(self.clone())
    }
}

async fn check(
    State(health): State<HealthService>,
    body: Bytes,
) -> Result<Json<HealthCheckResponse>, RpcStatus> {
    let request: HealthCheckRequest = decode_request(&body)?;
    let status = health.registry.check(&request.service);

    if let Some(meter) = &health.meter {
        meter.record_health_check(&request.service, status);
    }
    tracing::debug!(service = %request.service, status = %status, "Health check requested");

    Ok(Json(HealthCheckResponse { status }))
}

async fn watch(State(health): State<HealthService>, body: Bytes) -> RpcStatus {
    let request: HealthCheckRequest = match decode_request(&body) {
        Ok(request) => request,
        Err(status) => return status,
    };
    match health.registry.watch(&request.service) {
        Ok(never) => match never {},
        Err(err) => err.into(),
    }
}
