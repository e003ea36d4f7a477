//! ctxprobe server: the probe pipeline behind the HTTP transport.
//!
//! The server owns the registered endpoints and, per route, the factories
//! that build a fresh filter for every request. It provides the
//! `RequestHandler` implementation for the transport layer.

pub mod endpoints;
pub mod filters;
pub mod middleware;
pub mod probe;
pub mod router;

pub use endpoints::{ContinuationEndpoint, Endpoint, ReproEndpoint};
pub use filters::{ContinuationFilter, DelayActionFilter, FilterConfig};
pub use middleware::{ActionFilter, ActionFilterMiddleware, Middleware, Next};
pub use probe::{ContextProbe, FanoutSink, MemorySink, ProbeSink, TracingSink};
pub use router::ProbeServer;
