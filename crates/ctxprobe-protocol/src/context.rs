//! Request context: per-request state threaded through request handling.
//!
//! The transport builds one [`RequestContext`] per HTTP request and hands it
//! to the server explicitly. The same value is also installed as a task-local
//! for the lifetime of the request future, which is what the probe samples to
//! decide whether the request context is still reachable after a suspension.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;

tokio::task_local! {
    static CURRENT_REQUEST: RequestContext;
}

/// Context for a single HTTP request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    /// Unique identifier for the request (UUID v4).
    pub request_id: String,
    /// Route path the request was dispatched on, e.g. `/repro`.
    pub route: String,
    /// HTTP method, upper-case.
    pub method: String,
    /// When the transport accepted the request.
    pub received_at: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(method: impl Into<String>, route: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), method, route)
    }

    /// Build a context with a caller-chosen request id.
    pub fn with_id(
        request_id: impl Into<String>,
        method: impl Into<String>,
        route: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            route: route.into(),
            method: method.into(),
            received_at: Utc::now(),
        }
    }

    /// Run `fut` with this context installed as the task-scoped request.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT_REQUEST.scope(self, fut).await
    }

    /// Id of the task-scoped request, if the caller is running inside
    /// [`RequestContext::scope`].
    pub fn current_id() -> Option<String> {
        CURRENT_REQUEST
            .try_with(|ctx| ctx.request_id.clone())
            .ok()
    }

    /// Whether the task-scoped request is reachable and is this request.
    pub fn is_current(&self) -> bool {
        CURRENT_REQUEST
            .try_with(|ctx| ctx.request_id == self.request_id)
            .unwrap_or(false)
    }
}
