//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rpc_server_calls_total` (counter): calls by method, kind, code
//! - `rpc_server_call_duration_seconds` (histogram): call latency
//! - `health_checks_total` (counter): health `Check` calls by service, status
//! - `service_health_status` (gauge): 0=unknown, 1=not serving, 2=serving
//!
//! # Design Decisions
//! - Each provider owns its Prometheus recorder; nothing is installed
//!   globally, so several providers can live in one process
//! - Every sample carries a `service` label
//! - `/metrics` is served on its own port, separate from RPC traffic

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::health::ServingStatus;
use crate::observability::ObservabilityError;
use crate::rpc::{CallKind, Code};

pub const CALLS_TOTAL: &str = "rpc_server_calls_total";
pub const CALL_DURATION_SECONDS: &str = "rpc_server_call_duration_seconds";
pub const HEALTH_CHECKS_TOTAL: &str = "health_checks_total";
pub const HEALTH_STATUS: &str = "service_health_status";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Buckets tuned for RPC latencies, 1ms to 10s.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// How long `MetricsServer::stop` waits before aborting the task.
const METRICS_STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct Inner {
    service_name: String,
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    shut_down: AtomicBool,
}

/// Handle on the service's meter. Clones share the same recorder.
#[derive(Clone)]
pub struct MeterProvider {
    inner: Arc<Inner>,
}

impl fmt::Debug for MeterProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterProvider")
            .field("service_name", &self.inner.service_name)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

/// Build the meter provider for `service_name`.
pub fn init_metrics(service_name: &str) -> Result<MeterProvider, ObservabilityError> {
    if service_name.trim().is_empty() {
        return Err(ObservabilityError::Init {
            component: "meter",
            reason: "service name is empty".to_string(),
        });
    }

    let recorder = PrometheusBuilder::new()
        .add_global_label("service", service_name)
        .set_buckets_for_metric(
            Matcher::Full(CALL_DURATION_SECONDS.to_string()),
            DURATION_BUCKETS,
        )
        .map_err(|e| ObservabilityError::Init {
            component: "meter",
            reason: e.to_string(),
        })?
        .build_recorder();
    let handle = recorder.handle();

    tracing::debug!(service = %service_name, "Meter provider initialized");
    Ok(MeterProvider {
        inner: Arc::new(Inner {
            service_name: service_name.to_string(),
            recorder,
            handle,
            shut_down: AtomicBool::new(false),
        }),
    })
}

impl MeterProvider {
    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    fn record<F: FnOnce()>(&self, f: F) {
        if self.is_shut_down() {
            return;
        }
        metrics::with_local_recorder(&self.inner.recorder, f);
    }

    pub fn record_call(&self, method: &str, kind: CallKind, code: Code, elapsed: Duration) {
        let method = method.to_string();
        self.record(|| {
            metrics::counter!(
                CALLS_TOTAL,
                "method" => method.clone(),
                "kind" => kind.as_str(),
                "code" => code.as_str()
            )
            .increment(1);
            metrics::histogram!(
                CALL_DURATION_SECONDS,
                "method" => method,
                "kind" => kind.as_str()
            )
            .record(elapsed.as_secs_f64());
        });
    }

    pub fn record_health_check(&self, service: &str, status: ServingStatus) {
        let service = service.to_string();
        self.record(|| {
            metrics::counter!(
                HEALTH_CHECKS_TOTAL,
                "checked_service" => service,
                "status" => status.as_str()
            )
            .increment(1);
        });
    }

    pub fn record_health_status(&self, service: &str, status: ServingStatus) {
        let service = service.to_string();
        self.record(|| {
            metrics::gauge!(HEALTH_STATUS, "checked_service" => service)
                .set(status.as_metric());
        });
    }

    /// Prometheus text exposition of everything recorded so far.
    pub fn render(&self) -> String {
        self.inner.handle.run_upkeep();
        self.inner.handle.render()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Stop recording. Returns `false` if already shut down.
    pub fn shutdown(&self) -> bool {
        let first = !self.inner.shut_down.swap(true, Ordering::SeqCst);
        if first {
            tracing::debug!(service = %self.inner.service_name, "Meter provider shut down");
        }
        first
    }
}

/// Background `/metrics` endpoint.
#[derive(Debug)]
pub struct MetricsServer {
    local_addr: Option<SocketAddr>,
    task: Option<JoinHandle<()>>,
}

impl MetricsServer {
    fn disabled() -> Self {
        Self {
            local_addr: None,
            task: None,
        }
    }

    /// Bound address, `None` when the endpoint could not start.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait for the endpoint to finish after shutdown was broadcast, aborting
    /// it if it does not.
    pub async fn stop(self) {
        let Some(mut task) = self.task else {
            return;
        };
        match tokio::time::timeout(METRICS_STOP_TIMEOUT, &mut task).await {
            Ok(Ok(())) => tracing::debug!("Metrics server stopped"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Metrics server task failed"),
            Err(_) => {
                tracing::warn!("Metrics server did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

/// Serve `/metrics` on `0.0.0.0:port` until `shutdown` fires.
///
/// A bind failure is logged and yields a disabled server; the RPC server
/// keeps running without metrics exposition.
pub async fn start_metrics_server(
    port: u16,
    meter: MeterProvider,
    mut shutdown: broadcast::Receiver<()>,
) -> MetricsServer {
    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(port, error = %e, "Failed to start metrics server");
            return MetricsServer::disabled();
        }
    };
    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(port, error = %e, "Failed to read metrics server address");
            return MetricsServer::disabled();
        }
    };

    let app = Router::new()
        .route("/metrics", get(scrape))
        .with_state(meter);

    let task = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Metrics server error");
        }
    });

    tracing::info!(address = %local_addr, "Metrics server listening");
    MetricsServer {
        local_addr: Some(local_addr),
        task: Some(task),
    }
}

async fn scrape(State(meter): State<MeterProvider>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], meter.render())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_with_service_label() {
        let meter = init_metrics("auth-service").unwrap();
        meter.record_call("/a.B/C", CallKind::Unary, Code::Ok, Duration::from_millis(3));

        let text = meter.render();
        assert!(text.contains(CALLS_TOTAL));
        assert!(text.contains(CALL_DURATION_SECONDS));
        assert!(text.contains(r#"service="auth-service""#));
        assert!(text.contains(r#"code="OK""#));
    }

    #[test]
    fn providers_are_isolated() {
        let auth = init_metrics("auth-service").unwrap();
        let audit = init_metrics("audit-service").unwrap();

        auth.record_health_check("auth-service", ServingStatus::Serving);
        assert!(auth.render().contains(HEALTH_CHECKS_TOTAL));
        assert!(!audit.render().contains(HEALTH_CHECKS_TOTAL));
    }

    #[test]
    fn health_status_gauge() {
        let meter = init_metrics("auth-service").unwrap();
        meter.record_health_status("auth-service", ServingStatus::Serving);
        let text = meter.render();
        assert!(text.contains(HEALTH_STATUS));
        assert!(text.contains(" 2"));
    }

    #[test]
    fn nothing_recorded_after_shutdown() {
        let meter = init_metrics("auth-service").unwrap();
        assert!(meter.shutdown());
        assert!(!meter.shutdown());

        meter.record_call("/a.B/C", CallKind::Unary, Code::Ok, Duration::from_millis(1));
        meter.record_health_check("", ServingStatus::Serving);
        let text = meter.render();
        assert!(!text.contains(CALLS_TOTAL));
        assert!(!text.contains(HEALTH_CHECKS_TOTAL));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            init_metrics(""),
            Err(ObservabilityError::Init { component: "meter", .. })
        ));
    }

    #[tokio::test]
    async fn serves_text_format_until_shutdown() {
        let meter = init_metrics("auth-service").unwrap();
        meter.record_health_check("auth-service", ServingStatus::Serving);
        let (tx, rx) = broadcast::channel(1);

        let server = start_metrics_server(0, meter, rx).await;
        assert!(server.is_running());
        let port = server.local_addr().unwrap().port();

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let response = client
            .get(format!("http://127.0.0.1:{port}/metrics"))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            PROMETHEUS_CONTENT_TYPE
        );
        assert!(response.text().await.unwrap().contains(HEALTH_CHECKS_TOTAL));

        tx.send(()).unwrap();
        server.stop().await;
    }

    #[tokio::test]
    async fn occupied_port_yields_disabled_server() {
        let taken = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let (_tx, rx) = broadcast::channel(1);

        let server = start_metrics_server(port, init_metrics("auth-service").unwrap(), rx).await;
        assert!(server.local_addr().is_none());
        assert!(!server.is_running());
        server.stop().await;
    }
}
