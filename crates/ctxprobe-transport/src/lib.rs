//! ctxprobe transport layer
//!
//! Serves the probe pipeline over HTTP. The transport layer handles:
//! - Route mounting for every route the handler reports
//! - Building the per-request context and scoping the request future to it
//! - Mapping handler results to HTTP responses
//! - Health check and graceful stop
//!
//! The transport is decoupled from the server logic via the `RequestHandler` trait.

pub mod server;

pub use server::{REQUEST_ID_HEADER, RequestHandler, TransportConfig, TransportServer};
