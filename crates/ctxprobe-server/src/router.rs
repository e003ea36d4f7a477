//! Probe server router: the composition root.
//!
//! Maps each route to its endpoint and to the factories that build that
//! route's filters. A fresh filter chain is constructed for every request and
//! passed explicitly into the pipeline; nothing is resolved implicitly.

use std::collections::HashMap;

use ctxprobe_protocol::{HandlerResult, ProbeError, RequestContext};
use ctxprobe_transport::RequestHandler;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::endpoints::{ContinuationEndpoint, Endpoint, ReproEndpoint};
use crate::filters::{ContinuationFilter, DelayActionFilter, FilterConfig};
use crate::middleware::{ActionFilterMiddleware, Middleware, MiddlewareDyn, Next};
use crate::probe::ContextProbe;

struct FilterEntry {
    name: &'static str,
    build: Box<dyn Fn() -> Box<dyn MiddlewareDyn> + Send + Sync>,
}

impl FilterEntry {
    fn new<M, F>(filter: F) -> Self
    where
        M: Middleware + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        Self {
            name: M::NAME,
            build: Box::new(move || Box::new(filter()) as Box<dyn MiddlewareDyn>),
        }
    }
}

struct Registration {
    endpoint: Box<dyn Endpoint>,
    /// Run in registration order, outermost first.
    filters: Vec<FilterEntry>,
}

/// The probe server: owns endpoints and routes requests through their
/// per-request filter chains.
pub struct ProbeServer {
    routes: HashMap<String, Registration>,
    state: RwLock<ServerState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Uninitialized,
    Running,
    Shutdown,
}

impl ProbeServer {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            state: RwLock::new(ServerState::Uninitialized),
        }
    }

    /// The harness wiring: `/repro` behind the hook-style delay filter,
    /// `/continuation` behind the continuation filter.
    pub fn standard(probe: ContextProbe, config: FilterConfig) -> Self {
        let mut server = Self::new();

        let filter_probe = probe.clone();
        server.register(ReproEndpoint::new(probe.clone()), move || {
            ActionFilterMiddleware::new(DelayActionFilter::new(filter_probe.clone(), config))
        });

        let filter_probe = probe.clone();
        server.register(ContinuationEndpoint::new(probe), move || {
            ContinuationFilter::new(filter_probe.clone(), config)
        });

        server
    }

    /// Register an endpoint with the filter built for each of its requests.
    /// Re-registering a route replaces the earlier registration.
    pub fn register<E, M, F>(&mut self, endpoint: E, filter: F)
    where
        E: Endpoint + 'static,
        M: Middleware + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        self.insert(endpoint, vec![FilterEntry::new(filter)]);
    }

    /// Register an endpoint with no filters.
    pub fn register_unfiltered<E: Endpoint + 'static>(&mut self, endpoint: E) {
        self.insert(endpoint, Vec::new());
    }

    fn insert<E: Endpoint + 'static>(&mut self, endpoint: E, filters: Vec<FilterEntry>) {
        let route = endpoint.route().to_string();
        info!("Registering endpoint: {route}");
        let registration = Registration {
            endpoint: Box::new(endpoint),
            filters,
        };
        if self.routes.insert(route.clone(), registration).is_some() {
            warn!("Endpoint for {route} replaced an earlier registration");
        }
    }

    /// Append a filter to an already registered route. It runs inside the
    /// filters added before it.
    pub fn add_filter<M, F>(&mut self, route: &str, filter: F) -> Result<(), ProbeError>
    where
        M: Middleware + 'static,
        F: Fn() -> M + Send + Sync + 'static,
    {
        let registration = self
            .routes
            .get_mut(route)
            .ok_or_else(|| ProbeError::route_not_found(route))?;
        registration.filters.push(FilterEntry::new(filter));
        Ok(())
    }

    /// Mark the server ready to serve.
    pub fn initialize(&self) {
        *self.state.write() = ServerState::Running;
        info!("Probe server initialized ({} routes)", self.routes.len());
    }

    /// Refuse further requests. Requests already in a filter run to completion.
    pub fn shutdown(&self) {
        let mut state = self.state.write();
        if *state == ServerState::Shutdown {
            return;
        }
        *state = ServerState::Shutdown;
        info!("Probe server shutdown complete");
    }

    /// Names of the filters a request on `route` passes through.
    pub fn filter_names(&self, route: &str) -> Vec<&'static str> {
        self.routes
            .get(route)
            .map(|r| r.filters.iter().map(|f| f.name).collect())
            .unwrap_or_default()
    }
}

impl Default for ProbeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestHandler for ProbeServer {
    async fn handle_request(&self, ctx: RequestContext) -> HandlerResult {
        let state = *self.state.read();
        match state {
            ServerState::Shutdown => return Err(ProbeError::ShuttingDown),
            ServerState::Uninitialized => {
                return Err(ProbeError::internal("server is not initialized"));
            }
            ServerState::Running => {}
        }

        let registration = self
            .routes
            .get(&ctx.route)
            .ok_or_else(|| ProbeError::route_not_found(&ctx.route))?;

        // Per-request filter instances.
        let chain: Vec<Box<dyn MiddlewareDyn>> =
            registration.filters.iter().map(|f| (f.build)()).collect();
        debug!(
            request_id = %ctx.request_id,
            route = %ctx.route,
            filters = chain.len(),
            "dispatching request"
        );

        Next::new(&chain, &*registration.endpoint).run(&ctx).await
    }

    fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self.routes.keys().cloned().collect();
        routes.sort();
        routes
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::probe::MemorySink;
    use ctxprobe_protocol::{Phase, Reply};

    /// Endpoint on a shared route that answers with its own marker.
    struct Marked(&'static str);

    impl Endpoint for Marked {
        fn route(&self) -> &str {
            "/shared"
        }

        fn handle(&self, _ctx: &RequestContext) -> HandlerResult {
            Ok(Reply::new(200, self.0))
        }
    }

    fn server(sink: Arc<MemorySink>) -> ProbeServer {
        let server = ProbeServer::standard(
            ContextProbe::new(sink),
            FilterConfig::with_delay(Duration::from_millis(10)),
        );
        server.initialize();
        server
    }

    #[test]
    fn standard_wiring() {
        let server = server(Arc::new(MemorySink::new()));
        assert_eq!(server.routes(), vec!["/continuation", "/repro"]);
        assert_eq!(server.filter_names("/repro"), vec!["delay-action"]);
        assert_eq!(server.filter_names("/continuation"), vec!["continuation"]);
        assert!(server.filter_names("/missing").is_empty());
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let server = server(Arc::new(MemorySink::new()));
        let err = server
            .handle_request(RequestContext::new("GET", "/missing"))
            .await
            .unwrap_err();
        assert_eq!(err, ProbeError::route_not_found("/missing"));
    }

    #[tokio::test]
    async fn requests_before_initialize_are_refused() {
        let sink = Arc::new(MemorySink::new());
        let server = ProbeServer::standard(ContextProbe::new(sink.clone()), FilterConfig::default());
        let err = server
            .handle_request(RequestContext::new("GET", "/repro"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), 500);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn requests_after_shutdown_are_refused() {
        let sink = Arc::new(MemorySink::new());
        let server = server(sink.clone());
        server.shutdown();
        server.shutdown();
        let err = server
            .handle_request(RequestContext::new("GET", "/repro"))
            .await
            .unwrap_err();
        assert_eq!(err, ProbeError::ShuttingDown);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn repro_route_probes_three_times() {
        let sink = Arc::new(MemorySink::new());
        let server = server(sink.clone());
        let ctx = RequestContext::new("GET", "/repro");
        let id = ctx.request_id.clone();

        let reply = server.handle_request(ctx).await.unwrap();
        assert_eq!(reply, Reply::empty());
        let phases: Vec<Phase> = sink.for_request(&id).iter().map(|r| r.phase).collect();
        assert_eq!(
            phases,
            vec![Phase::BeforeSuspend, Phase::AfterSuspend, Phase::AtEndpoint]
        );
    }

    #[test]
    fn add_filter_to_unknown_route_fails() {
        let mut server = ProbeServer::new();
        let err = server
            .add_filter("/nope", || {
                ContinuationFilter::new(ContextProbe::tracing(), FilterConfig::default())
            })
            .unwrap_err();
        assert_eq!(err, ProbeError::route_not_found("/nope"));
    }

    #[tokio::test]
    async fn reregistering_a_route_replaces_endpoint_and_filters() {
        let sink = Arc::new(MemorySink::new());
        let probe = ContextProbe::new(sink.clone());
        let mut server = ProbeServer::new();
        server.register(Marked("first"), move || {
            ContinuationFilter::new(probe.clone(), FilterConfig::with_delay(Duration::ZERO))
        });
        assert_eq!(server.filter_names("/shared"), vec!["continuation"]);

        server.register_unfiltered(Marked("second"));
        server.initialize();

        assert_eq!(server.routes(), vec!["/shared"]);
        assert!(server.filter_names("/shared").is_empty());
        let reply = server
            .handle_request(RequestContext::new("GET", "/shared"))
            .await
            .unwrap();
        assert_eq!(reply.body, "second");
        // The first registration's filter would have recorded two entries.
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn filter_names_do_not_build_filters() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let mut server = ProbeServer::new();
        server.register(Marked("only"), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ContinuationFilter::new(ContextProbe::tracing(), FilterConfig::with_delay(Duration::ZERO))
        });
        server.initialize();

        assert_eq!(server.filter_names("/shared"), vec!["continuation"]);
        assert_eq!(server.filter_names("/shared"), vec!["continuation"]);
        assert_eq!(built.load(Ordering::SeqCst), 0);

        server
            .handle_request(RequestContext::new("GET", "/shared"))
            .await
            .unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }
}
