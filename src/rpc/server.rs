//! RPC server setup and serving.
//!
//! # Responsibilities
//! - Mount every registered service's routes
//! - Apply the interceptor chain once, at construction
//! - Attach request ids and in-flight tracking
//! - Serve on a bound listener until the stop future resolves, then drain

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::rpc::interceptor::{track_in_flight, InFlight, InterceptorChain, InterceptorPair};
use crate::rpc::reflection::ReflectionService;
use crate::rpc::{RpcService, RpcStatus};

/// Collects services and interceptors before the router is frozen.
#[derive(Default)]
pub struct RpcServerBuilder {
    services: Vec<Arc<dyn RpcService>>,
    interceptors: InterceptorChain,
}

impl RpcServerBuilder {
    pub fn add_service(mut self, service: Arc<dyn RpcService>) -> Self {
        self.services.push(service);
        self
    }

    /// Interceptors run in the order they are added.
    pub fn with_interceptors(mut self, pair: InterceptorPair) -> Self {
        self.interceptors.push(pair);
        self
    }

    /// Freeze the router. The reflection service is registered last so it
    /// can list everything else.
    pub fn build(self) -> RpcServer {
        let names: Vec<String> = self.services.iter().map(|s| s.name().to_string()).collect();
        let reflection = ReflectionService::new(names);
        let services = reflection.services().to_vec();

        let mut unary = Router::new();
        let mut streaming = Router::new();
        let mounted = self
            .services
            .iter()
            .map(|s| s.as_ref())
            .chain(std::iter::once(&reflection as &dyn RpcService));
        for service in mounted {
            unary = unary.merge(service.unary_routes());
            streaming = streaming.merge(service.streaming_routes());
        }

        let in_flight = InFlight::default();
        let router = self
            .interceptors
            .wrap_unary(unary)
            .merge(self.interceptors.wrap_streaming(streaming))
            .fallback(unknown_method)
            .layer(from_fn_with_state(in_flight.clone(), track_in_flight))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        tracing::debug!(
            services = ?services,
            interceptors = self.interceptors.len(),
            "RPC server constructed"
        );

        RpcServer {
            router,
            services,
            in_flight,
        }
    }
}

/// A constructed RPC server, ready to serve on a listener.
pub struct RpcServer {
    router: Router,
    services: Vec<String>,
    in_flight: InFlight,
}

impl RpcServer {
    pub fn builder() -> RpcServerBuilder {
        RpcServerBuilder::default()
    }

    /// Names of all mounted services, reflection included.
    pub fn services(&self) -> &[String] {
        &self.services
    }

    /// Shared handle on the number of calls currently executing.
    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `stop` resolves, then stop accepting, let in-flight calls
    /// finish and close the listener.
    pub async fn serve<F>(self, listener: TcpListener, stop: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router)
            .with_graceful_shutdown(stop)
            .await?;

        tracing::info!("RPC server stopped");
        Ok(())
    }
}

async fn unknown_method() -> RpcStatus {
    RpcStatus::unimplemented("unknown service or method")
}
