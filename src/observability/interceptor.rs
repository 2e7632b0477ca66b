//! Tracing interceptors for the RPC server.

use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use axum::Router;
use tracing::Instrument;

use crate::observability::metrics::MeterProvider;
use crate::observability::tracing::TracerProvider;
use crate::rpc::status::code_of;
use crate::rpc::{CallKind, Interceptor, InterceptorPair};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
struct CallTelemetry {
    tracer: TracerProvider,
    meter: MeterProvider,
    kind: CallKind,
}

/// Unary and streaming interceptors that wrap each call in a span and
/// record call count and latency.
pub fn trace_interceptors(tracer: &TracerProvider, meter: &MeterProvider) -> InterceptorPair {
    InterceptorPair {
        unary: telemetry_interceptor(tracer, meter, CallKind::Unary),
        streaming: telemetry_interceptor(tracer, meter, CallKind::Streaming),
    }
}

fn telemetry_interceptor(
    tracer: &TracerProvider,
    meter: &MeterProvider,
    kind: CallKind,
) -> Interceptor {
    let state = CallTelemetry {
        tracer: tracer.clone(),
        meter: meter.clone(),
        kind,
    };
    Interceptor::new("trace", move |router: Router| {
        router.layer(from_fn_with_state(state.clone(), trace_call))
    })
}

async fn trace_call(
    State(telemetry): State<CallTelemetry>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let started = Instant::now();

    let response = match telemetry.tracer.start_span(telemetry.kind, &method, &request_id) {
        Some(span) => {
            let response = next.run(request).instrument(span.clone()).await;
            span.record("rpc.code", code_of(&response).as_str());
            response
        }
        None => next.run(request).await,
    };

    telemetry
        .meter
        .record_call(&method, telemetry.kind, code_of(&response), started.elapsed());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::{init_metrics, CALLS_TOTAL};
    use crate::observability::tracing::init_tracing;
    use crate::rpc::{InterceptorChain, RpcStatus};
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::routing::post;
    use tower::ServiceExt;

    fn wrapped(tracer: &TracerProvider, meter: &MeterProvider) -> Router {
        let mut chain = InterceptorChain::new();
        chain.push(trace_interceptors(tracer, meter));
        chain.wrap_unary(
            Router::new()
                .route("/t.Echo/Say", post(|| async { "ok" }))
                .route(
                    "/t.Echo/Fail",
                    post(|| async { RpcStatus::invalid_argument("bad") }),
                ),
        )
    }

    async fn call(router: Router, path: &str) {
        router
            .oneshot(
                HttpRequest::post(path)
                    .header(REQUEST_ID_HEADER, "req-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn calls_produce_spans_and_metrics() {
        let tracer = init_tracing("auth-service").unwrap();
        let meter = init_metrics("auth-service").unwrap();
        let router = wrapped(&tracer, &meter);

        call(router.clone(), "/t.Echo/Say").await;
        call(router, "/t.Echo/Fail").await;

        assert_eq!(tracer.spans_started(), 2);
        let text = meter.render();
        assert!(text.contains(CALLS_TOTAL));
        assert!(text.contains(r#"method="/t.Echo/Say""#));
        assert!(text.contains(r#"code="INVALID_ARGUMENT""#));
        assert!(text.contains(r#"kind="unary""#));
    }

    #[tokio::test]
    async fn nothing_recorded_after_provider_shutdown() {
        let tracer = init_tracing("auth-service").unwrap();
        let meter = init_metrics("auth-service").unwrap();
        let router = wrapped(&tracer, &meter);

        tracer.shutdown();
        meter.shutdown();
        call(router, "/t.Echo/Say").await;

        assert_eq!(tracer.spans_started(), 0);
        assert!(!meter.render().contains(CALLS_TOTAL));
    }
}
