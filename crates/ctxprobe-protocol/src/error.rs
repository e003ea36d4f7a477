//! Error types returned by the probe pipeline.

use thiserror::Error;

/// Errors a handler, filter, or the server itself can produce.
///
/// The harness has no recovery logic; these only exist so the transport can
/// pick a status code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("no endpoint registered for route {0}")]
    RouteNotFound(String),

    #[error("server is shutting down")]
    ShuttingDown,

    #[error("filter failed: {0}")]
    Filter(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProbeError {
    /// HTTP status code this error maps to.
    pub fn code(&self) -> u16 {
        match self {
            Self::RouteNotFound(_) => 404,
            Self::ShuttingDown => 503,
            Self::Filter(_) | Self::Internal(_) => 500,
        }
    }

    pub fn route_not_found(route: &str) -> Self {
        Self::RouteNotFound(route.to_string())
    }

    pub fn filter(message: impl Into<String>) -> Self {
        Self::Filter(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
