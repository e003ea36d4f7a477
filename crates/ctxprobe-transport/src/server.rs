//! HTTP transport server using Axum.
//!
//! Every probed route is mounted as a GET handler that builds a fresh
//! [`RequestContext`], installs it as the task-scoped request for the whole
//! request future, and hands it to the [`RequestHandler`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use ctxprobe_protocol::{HandlerResult, RequestContext};
use serde_json::json;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

/// Response header carrying the id of the request's context.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Trait implemented by the probe server to handle incoming requests.
/// The transport layer calls this for every request on a mounted route.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle a request and return its reply.
    fn handle_request(
        &self,
        ctx: RequestContext,
    ) -> impl std::future::Future<Output = HandlerResult> + Send;

    /// Routes to mount. Read once when the transport starts.
    fn routes(&self) -> Vec<String>;
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Enable permissive CORS
    pub enable_cors: bool,
    /// Enable verbose request logging
    pub verbose_logging: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 7070,
            hostname: "127.0.0.1".into(),
            enable_cors: false,
            verbose_logging: false,
        }
    }
}

/// Shared state for the transport server.
struct AppState<H: RequestHandler> {
    handler: Arc<H>,
    config: TransportConfig,
    routes: Vec<String>,
    /// Requests currently inside the handler (for health check)
    in_flight: AtomicUsize,
}

/// The transport server: owns the listener task.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Start the transport server with the given request handler.
    pub async fn start<H: RequestHandler>(
        config: TransportConfig,
        handler: H,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Self::start_with_handler(config, Arc::new(handler)).await
    }

    /// Start the transport server with a shared handler, so the caller can
    /// keep driving it (e.g. shutting it down) after start.
    pub async fn start_with_handler<H: RequestHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let routes = handler.routes();
        let state = Arc::new(AppState {
            handler,
            config: config.clone(),
            routes: routes.clone(),
            in_flight: AtomicUsize::new(0),
        });

        let mut app = Router::new().route("/health", get(health_handler::<H>));
        for route in &routes {
            app = app.route(route, get(dispatch_handler::<H>));
        }
        let app = app.fallback(fallback_handler).with_state(state).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .option_layer(config.enable_cors.then(CorsLayer::permissive)),
        );

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("Probe transport listening on http://{}:{}", config.hostname, actual_port);
        for route in &routes {
            info!("  GET {route}");
        }

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server, letting in-flight requests finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Probe transport server stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn dispatch_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
    method: Method,
    uri: Uri,
) -> Response {
    let ctx = RequestContext::new(method.as_str(), uri.path());
    let request_id = ctx.request_id.clone();
    if state.config.verbose_logging {
        debug!(request_id = %request_id, route = %ctx.route, "request received");
    }

    let result = {
        // Released on drop, so a request abandoned by its client still counts down.
        let _in_flight = InFlight::enter(&state.in_flight);
        ctx.clone().scope(state.handler.handle_request(ctx)).await
    };

    into_response(result, &request_id)
}

async fn health_handler<H: RequestHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "routes": state.routes,
        "inFlight": state.in_flight.load(Ordering::Relaxed),
    }))
}

async fn fallback_handler(uri: Uri) -> impl IntoResponse {
    debug!("No route for {}", uri.path());
    StatusCode::NOT_FOUND
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Holds one slot of the in-flight counter for as long as it lives.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

fn into_response(result: HandlerResult, request_id: &str) -> Response {
    let mut response = match result {
        Ok(reply) => {
            let status =
                StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, reply.body).into_response()
        }
        Err(e) => {
            warn!(request_id = %request_id, "Request failed: {e}");
            let status =
                StatusCode::from_u16(e.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            status.into_response()
        }
    };
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxprobe_protocol::{ProbeError, Reply};

    #[test]
    fn empty_reply_maps_to_ok() {
        let response = into_response(Ok(Reply::empty()), "req-1");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-1");
    }

    #[test]
    fn errors_map_to_their_status() {
        let cases = [
            (ProbeError::route_not_found("/x"), StatusCode::NOT_FOUND),
            (ProbeError::ShuttingDown, StatusCode::SERVICE_UNAVAILABLE),
            (ProbeError::filter("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(into_response(Err(err), "req-2").status(), status);
        }
    }

    #[test]
    fn in_flight_slot_is_released_on_drop() {
        let counter = AtomicUsize::new(0);
        {
            let _a = InFlight::enter(&counter);
            let _b = InFlight::enter(&counter);
            assert_eq!(counter.load(Ordering::Relaxed), 2);
        }
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn default_config_binds_localhost() {
        let config = TransportConfig::default();
        assert_eq!(config.hostname, "127.0.0.1");
        assert_eq!(config.port, 7070);
        assert!(!config.enable_cors);
    }
}
