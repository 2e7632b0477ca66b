//! Reflection/debug service listing what the server exposes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::rpc::{method_path, RpcService};

pub const SERVICE_NAME: &str = "grpc.reflection.v1.ServerReflection";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListServicesResponse {
    pub services: Vec<String>,
}

/// Answers `ListServices` with every service registered on the server.
#[derive(Debug, Clone)]
pub struct ReflectionService {
    services: Arc<Vec<String>>,
}

impl ReflectionService {
    /// `services` should not include the reflection service itself; it is
    /// appended here.
    pub fn new(mut services: Vec<String>) -> Self {
        services.push(SERVICE_NAME.to_string());
        services.sort();
        services.dedup();
        Self {
            services: Arc::new(services),
        }
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }
}

impl RpcService for ReflectionService {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    fn unary_routes(&self) -> Router {
        Router::new()
            .route(&method_path(SERVICE_NAME, "ListServices"), post(list_services))
            .with_state(Arc::clone(&self.services))
    }
}

async fn list_services(State(services): State<Arc<Vec<String>>>) -> Json<ListServicesResponse> {
    tracing::debug!(count = services.len(), "Reflection list requested");
    Json(ListServicesResponse {
        services: services.as_ref().clone(),
    })
}
