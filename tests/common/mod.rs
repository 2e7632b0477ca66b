//! Shared utilities for lifecycle integration tests.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::Router;
use service_bootstrap::config::{ServiceConfig, ServiceKind};
use service_bootstrap::health::{HealthCheckRequest, HealthCheckResponse, ServingStatus};
use service_bootstrap::lifecycle::LifecyclePhase;
use service_bootstrap::rpc::{method_path, RpcService};
use tokio::sync::{watch, Notify};

pub const SLOW_SERVICE: &str = "test.v1.Slow";

/// Config for `kind` on OS-assigned ports with a short drain bound.
pub fn test_config(kind: ServiceKind) -> ServiceConfig {
    let mut config = ServiceConfig::defaults_for(kind);
    config.port = 0;
    config.observability.prometheus_port = 0;
    config.shutdown_timeout = Duration::from_secs(5);
    config
}

/// Client that never goes through an HTTP proxy from the environment.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Wait until the orchestrator publishes `Serving` and return a loopback
/// address for the bound port.
pub async fn wait_for_serving(phases: &mut watch::Receiver<LifecyclePhase>) -> SocketAddr {
    let phase = tokio::time::timeout(
        Duration::from_secs(5),
        phases.wait_for(|p| matches!(p, LifecyclePhase::Serving { .. })),
    )
    .await
    .expect("service did not start serving")
    .expect("orchestrator dropped")
    .clone();

    match phase {
        LifecyclePhase::Serving { addr } => SocketAddr::from((Ipv4Addr::LOCALHOST, addr.port())),
        other => panic!("unexpected phase {other:?}"),
    }
}

pub async fn wait_for_phase(phases: &mut watch::Receiver<LifecyclePhase>, wanted: LifecyclePhase) {
    tokio::time::timeout(Duration::from_secs(5), phases.wait_for(|p| *p == wanted))
        .await
        .expect("phase not reached")
        .expect("orchestrator dropped");
}

/// Call the health `Check` RPC over the network.
pub async fn check_health(addr: SocketAddr, service: &str) -> ServingStatus {
    let response: HealthCheckResponse = client()
        .post(format!("http://{addr}{}", method_path("grpc.health.v1.Health", "Check")))
        .json(&HealthCheckRequest {
            service: service.to_string(),
        })
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    response.status
}

/// Business service whose `Wait` method parks for `delay` after announcing
/// that it started.
pub struct SlowService {
    pub started: Arc<Notify>,
    pub delay: Duration,
}

impl SlowService {
    pub fn new(delay: Duration) -> Self {
        Self {
            started: Arc::new(Notify::new()),
            delay,
        }
    }
}

impl RpcService for SlowService {
    fn name(&self) -> &str {
        SLOW_SERVICE
    }

    fn unary_routes(&self) -> Router {
        let started = Arc::clone(&self.started);
        let delay = self.delay;
        Router::new().route(
            &method_path(SLOW_SERVICE, "Wait"),
            post(move || {
                let started = Arc::clone(&started);
                async move {
                    started.notify_one();
                    tokio::time::sleep(delay).await;
                    "done"
                }
            }),
        )
    }
}
