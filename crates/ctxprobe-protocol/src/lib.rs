//! ctxprobe protocol types
//!
//! Shared vocabulary for the probe harness: the per-request context that is
//! threaded explicitly through filters and endpoints, the probe record each
//! probe point produces, and the error/result types handlers return.

pub mod context;
pub mod error;
pub mod record;
pub mod reply;

pub use context::RequestContext;
pub use error::ProbeError;
pub use record::{Phase, ProbeRecord};
pub use reply::{HandlerResult, Reply};
