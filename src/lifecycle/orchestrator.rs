//! Top-level run loop: start, serve, wait, drain, tear down.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};

use crate::config::ServiceConfig;
use crate::health::{HealthRegistry, ServingStatus};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::lifecycle::signals::{self, next_signal};
use crate::lifecycle::startup::{self, Started};
use crate::lifecycle::{LifecycleError, LifecyclePhase};
use crate::observability::{MeterProvider, ObservabilityHandles};
use crate::rpc::{InFlight, RpcServer, RpcService};

type ServeTask = JoinHandle<io::Result<()>>;

/// Runs one service from configuration to exit.
///
/// ```no_run
/// # async fn demo() {
/// use service_bootstrap::config::{ServiceConfig, ServiceKind};
/// use service_bootstrap::lifecycle::{exit_code, Orchestrator};
///
/// let config = ServiceConfig::defaults_for(ServiceKind::Audit);
/// let result = Orchestrator::new(config).run().await;
/// std::process::exit(exit_code(&result).into());
/// # }
/// ```
pub struct Orchestrator {
    config: ServiceConfig,
    health: Arc<HealthRegistry>,
    services: Vec<Arc<dyn RpcService>>,
    observability: Option<ObservabilityHandles>,
    phase: watch::Sender<LifecyclePhase>,
}

impl Orchestrator {
    pub fn new(config: ServiceConfig) -> Self {
        let (phase, _) = watch::channel(LifecyclePhase::Starting);
        Self {
            config,
            health: Arc::new(HealthRegistry::new()),
            services: Vec::new(),
            observability: None,
            phase,
        }
    }

    /// Mount a business service next to the health and reflection services.
    pub fn with_service(mut self, service: Arc<dyn RpcService>) -> Self {
        self.services.push(service);
        self
    }

    /// Use already initialized providers instead of creating them at
    /// startup. They are still shut down by the orchestrator.
    pub fn with_observability(mut self, handles: ObservabilityHandles) -> Self {
        self.observability = Some(handles);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Shared health registry, readable while the service runs.
    pub fn health(&self) -> Arc<HealthRegistry> {
        Arc::clone(&self.health)
    }

    pub fn phases(&self) -> watch::Receiver<LifecyclePhase> {
        self.phase.subscribe()
    }

    /// Run until SIGINT/SIGTERM, then drain.
    pub async fn run(self) -> Result<(), LifecycleError> {
        let signals = match signals::listen() {
            Ok(signals) => signals,
            Err(e) => {
                let err = LifecycleError::Signals(e);
                self.log_fatal(&err);
                self.phase.send_replace(LifecyclePhase::Stopped);
                return Err(err);
            }
        };
        self.run_with_signals(signals).await
    }

    /// Run until the first value arrives on `signals`, then drain. A second
    /// value during the drain aborts it.
    pub async fn run_with_signals(
        self,
        signals: mpsc::Receiver<ShutdownSignal>,
    ) -> Result<(), LifecycleError> {
        self.run_serving_with(signals, serve_rpc).await
    }

    /// Same as [`Orchestrator::run_with_signals`], with `serve` producing the
    /// serve loop from the built server, the bound listener and the stop
    /// trigger.
    pub(crate) async fn run_serving_with<F, S>(
        mut self,
        mut signals: mpsc::Receiver<ShutdownSignal>,
        serve: F,
    ) -> Result<(), LifecycleError>
    where
        F: FnOnce(RpcServer, TcpListener, broadcast::Receiver<()>) -> S,
        S: Future<Output = io::Result<()>> + Send + 'static,
    {
        let handles = self.observability.take();
        let result = self.drive(handles, &mut signals, serve).await;
        if let Err(e) = &result {
            self.log_fatal(e);
        }
        self.phase.send_replace(LifecyclePhase::Stopped);
        result
    }

    async fn drive<F, S>(
        &self,
        handles: Option<ObservabilityHandles>,
        signals: &mut mpsc::Receiver<ShutdownSignal>,
        serve: F,
    ) -> Result<(), LifecycleError>
    where
        F: FnOnce(RpcServer, TcpListener, broadcast::Receiver<()>) -> S,
        S: Future<Output = io::Result<()>> + Send + 'static,
    {
        let Started {
            handles,
            metrics_server,
            shutdown,
            server,
            listener,
            local_addr,
        } = startup::start(&self.config, &self.health, &self.services, handles).await?;

        let in_flight = server.in_flight();
        let mut serve_task: ServeTask = tokio::spawn(serve(server, listener, shutdown.subscribe()));

        self.mark_serving(handles.meter());
        self.phase.send_replace(LifecyclePhase::Serving { addr: local_addr });
        tracing::info!(
            service = %self.config.service_name,
            environment = %self.config.environment,
            address = %local_addr,
            "Service serving"
        );

        let (outcome, serve_done) = tokio::select! {
            signal = next_signal(signals) => {
                tracing::info!(signal = %signal, "Shutdown requested, draining");
                (Ok(()), false)
            }
            joined = &mut serve_task => {
                let err = serve_exit_error(joined);
                tracing::error!(error = %err, "Server stopped unexpectedly, draining");
                (Err(err), true)
            }
        };

        for name in self.health.shutdown() {
            handles.meter().record_health_status(&name, ServingStatus::NotServing);
        }
        self.phase.send_replace(LifecyclePhase::Draining);
        shutdown.trigger();

        let drained = if serve_done {
            Ok(())
        } else {
            drain(serve_task, self.config.shutdown_timeout, signals, &in_flight).await
        };

        metrics_server.stop().await;
        handles.shutdown();
        tracing::info!(service = %self.config.service_name, "Shutdown complete");

        outcome.and(drained)
    }

    fn mark_serving(&self, meter: &MeterProvider) {
        for (name, _) in self.health.snapshot() {
            match self.health.set_serving(&name) {
                Ok(()) => meter.record_health_status(&name, ServingStatus::Serving),
                Err(e) => tracing::warn!(error = %e, "Could not mark service serving"),
            }
        }
    }

    fn log_fatal(&self, err: &LifecycleError) {
        tracing::error!(
            service = %self.config.service_name,
            environment = %self.config.environment,
            step = err.step(),
            error = %err,
            "Service failed"
        );
    }
}

/// Wait for the serve loop to finish its graceful stop, bounded by
/// `timeout` and by a second signal. The task is aborted on either.
async fn drain(
    mut serve_task: ServeTask,
    timeout: Duration,
    signals: &mut mpsc::Receiver<ShutdownSignal>,
    in_flight: &InFlight,
) -> Result<(), LifecycleError> {
    tracing::info!(in_flight = in_flight.count(), timeout = ?timeout, "Draining in-flight calls");

    let result = tokio::select! {
        joined = &mut serve_task => {
            return match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(LifecycleError::Serve(e)),
                Err(e) => Err(LifecycleError::ServeTaskFailed(e.to_string())),
            };
        }
        _ = tokio::time::sleep(timeout) => {
            tracing::warn!(in_flight = in_flight.count(), "Drain timed out, aborting server");
            Err(LifecycleError::DrainTimeout { timeout })
        }
        signal = next_signal(signals) => {
            tracing::warn!(signal = %signal, in_flight = in_flight.count(), "Second signal, forcing shutdown");
            Err(LifecycleError::ForcedShutdown { signal })
        }
    };

    serve_task.abort();
    let _ = serve_task.await;
    result
}

async fn serve_rpc(
    server: RpcServer,
    listener: TcpListener,
    mut stop: broadcast::Receiver<()>,
) -> io::Result<()> {
    server
        .serve(listener, async move {
            let _ = stop.recv().await;
        })
        .await
}

fn serve_exit_error(joined: Result<io::Result<()>, JoinError>) -> LifecycleError {
    match joined {
        Ok(Ok(())) => LifecycleError::ServeExited,
        Ok(Err(e)) => LifecycleError::Serve(e),
        Err(e) => LifecycleError::ServeTaskFailed(e.to_string()),
    }
}
