//! Startup sequence, up to a bound listener.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and nothing is retried
//! - Subsystems initialize in order, not concurrently
//! - The listener is bound last; whatever started before it is torn down
//!   again when binding fails

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::ServiceConfig;
use crate::health::{HealthRegistry, HealthService};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::LifecycleError;
use crate::net;
use crate::observability::{start_metrics_server, MetricsServer, ObservabilityHandles};
use crate::rpc::{RpcServer, RpcService};

/// Everything running once startup succeeds; the server is not serving yet.
pub(crate) struct Started {
    pub handles: ObservabilityHandles,
    pub metrics_server: MetricsServer,
    pub shutdown: Shutdown,
    pub server: RpcServer,
    pub listener: TcpListener,
    pub local_addr: SocketAddr,
}

pub(crate) async fn start(
    config: &ServiceConfig,
    health: &Arc<HealthRegistry>,
    services: &[Arc<dyn RpcService>],
    handles: Option<ObservabilityHandles>,
) -> Result<Started, LifecycleError> {
    let handles = match handles {
        Some(handles) => handles,
        None => ObservabilityHandles::init(&config.service_name)?,
    };

    let shutdown = Shutdown::new();
    let metrics_server = start_metrics_server(
        config.observability.prometheus_port,
        handles.meter().clone(),
        shutdown.subscribe(),
    )
    .await;

    health.register(&config.service_name);
    health.register("");
    for service in services {
        health.register(service.name());
    }
    for (name, status) in health.snapshot() {
        handles.meter().record_health_status(&name, status);
    }

    let health_service = HealthService::new(Arc::clone(health)).with_meter(handles.meter().clone());
    let server = services
        .iter()
        .fold(
            RpcServer::builder()
                .with_interceptors(handles.interceptors())
                .add_service(Arc::new(health_service)),
            |builder, service| builder.add_service(Arc::clone(service)),
        )
        .build();

    let (listener, local_addr) = match net::bind(config.port).await {
        Ok(bound) => bound,
        Err(e) => {
            shutdown.trigger();
            metrics_server.stop().await;
            handles.shutdown();
            return Err(e.into());
        }
    };

    tracing::info!(
        service = %config.service_name,
        services = ?server.services(),
        "Startup complete"
    );

    Ok(Started {
        handles,
        metrics_server,
        shutdown,
        server,
        listener,
        local_addr,
    })
}
