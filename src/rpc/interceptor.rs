//! Interceptors: ordered wrap functions applied around RPC calls.
//!
//! An interceptor is a `Router → Router` function, usually adding an axum
//! middleware layer. The chain keeps one list for unary methods and one for
//! streaming methods and applies them once when the server is built.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::Router;

/// Shape of an RPC method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Unary,
    Streaming,
}

impl CallKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Unary => "unary",
            CallKind::Streaming => "streaming",
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type WrapFn = Arc<dyn Fn(Router) -> Router + Send + Sync>;

/// A named wrap function.
#[derive(Clone)]
pub struct Interceptor {
    name: &'static str,
    wrap: WrapFn,
}

impl Interceptor {
    pub fn new<F>(name: &'static str, wrap: F) -> Self
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        Self {
            name,
            wrap: Arc::new(wrap),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn apply(&self, router: Router) -> Router {
        (self.wrap)(router)
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor").field("name", &self.name).finish()
    }
}

/// Unary and streaming variants of the same cross-cutting behavior.
#[derive(Debug, Clone)]
pub struct InterceptorPair {
    pub unary: Interceptor,
    pub streaming: Interceptor,
}

/// Ordered interceptor lists. The first interceptor pushed is the outermost
/// and sees every call first.
#[derive(Debug, Clone, Default)]
pub struct InterceptorChain {
    unary: Vec<Interceptor>,
    streaming: Vec<Interceptor>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pair: InterceptorPair) {
        self.unary.push(pair.unary);
        self.streaming.push(pair.streaming);
    }

    pub fn len(&self) -> usize {
        self.unary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unary.is_empty()
    }

    pub fn wrap_unary(&self, router: Router) -> Router {
        Self::wrap(&self.unary, router)
    }

    pub fn wrap_streaming(&self, router: Router) -> Router {
        Self::wrap(&self.streaming, router)
    }

    // Router::layer makes the last layer outermost, so apply back to front.
    fn wrap(interceptors: &[Interceptor], router: Router) -> Router {
        interceptors
            .iter()
            .rev()
            .fold(router, |router, interceptor| interceptor.apply(router))
    }
}

/// Count of calls currently being handled.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicU64>);

impl InFlight {
    pub fn count(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Track one call until the guard is dropped.
    pub fn enter(&self) -> InFlightGuard {
        self.0.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(Arc::clone(&self.0))
    }
}

/// Decrements the in-flight count on drop, including on panic unwind.
#[derive(Debug)]
pub struct InFlightGuard(Arc<AtomicU64>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) async fn track_in_flight(
    State(in_flight): State<InFlight>,
    request: Request,
    next: Next,
) -> Response {
    let _guard = in_flight.enter();
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use axum::middleware::from_fn_with_state;
    use axum::routing::post;
    use std::sync::Mutex;
    use tower::ServiceExt;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    async fn record(
        State((log, label)): State<(Log, &'static str)>,
        request: Request,
        next: Next,
    ) -> Response {
        log.lock().unwrap().push(label);
        next.run(request).await
    }

    fn recording(log: &Log, label: &'static str) -> Interceptor {
        let state = (Arc::clone(log), label);
        Interceptor::new(label, move |router: Router| {
            router.layer(from_fn_with_state(state.clone(), record))
        })
    }

    #[tokio::test]
    async fn first_pushed_runs_outermost() {
        let log: Log = Arc::default();
        let mut chain = InterceptorChain::new();
        chain.push(InterceptorPair {
            unary: recording(&log, "outer"),
            streaming: recording(&log, "outer-stream"),
        });
        chain.push(InterceptorPair {
            unary: recording(&log, "inner"),
            streaming: recording(&log, "inner-stream"),
        });
        assert_eq!(chain.len(), 2);

        let router = chain.wrap_unary(Router::new().route("/t.Echo/Say", post(|| async { "ok" })));
        let response = router
            .oneshot(HttpRequest::post("/t.Echo/Say").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_success());
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn streaming_chain_is_separate() {
        let log: Log = Arc::default();
        let mut chain = InterceptorChain::new();
        chain.push(InterceptorPair {
            unary: recording(&log, "unary"),
            streaming: recording(&log, "streaming"),
        });

        let router =
            chain.wrap_streaming(Router::new().route("/t.Feed/Tail", post(|| async { "ok" })));
        router
            .oneshot(HttpRequest::post("/t.Feed/Tail").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["streaming"]);
    }

    #[test]
    fn in_flight_guard_counts() {
        let in_flight = InFlight::default();
        assert_eq!(in_flight.count(), 0);

        let first = in_flight.enter();
        let second = in_flight.enter();
        assert_eq!(in_flight.count(), 2);

        drop(first);
        assert_eq!(in_flight.count(), 1);
        drop(second);
        assert_eq!(in_flight.count(), 0);
    }
}
