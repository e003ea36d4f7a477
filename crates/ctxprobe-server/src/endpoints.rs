//! The two probed endpoints.

use ctxprobe_protocol::{HandlerResult, Phase, Reply, RequestContext};

use crate::probe::ContextProbe;

pub const REPRO_ROUTE: &str = "/repro";
pub const CONTINUATION_ROUTE: &str = "/continuation";

/// A GET endpoint at the end of a pipeline.
pub trait Endpoint: Send + Sync {
    /// Route path this endpoint is mounted on.
    fn route(&self) -> &str;

    /// Handle the request synchronously.
    fn handle(&self, ctx: &RequestContext) -> HandlerResult;
}

/// `GET /repro`: wrapped by the hook-style action filter.
pub struct ReproEndpoint {
    probe: ContextProbe,
}

impl ReproEndpoint {
    pub fn new(probe: ContextProbe) -> Self {
        Self { probe }
    }
}

impl Endpoint for ReproEndpoint {
    fn route(&self) -> &str {
        REPRO_ROUTE
    }

    fn handle(&self, ctx: &RequestContext) -> HandlerResult {
        self.probe.probe(ctx, Phase::AtEndpoint);
        Ok(Reply::empty())
    }
}

/// `GET /continuation`: wrapped by the continuation filter.
pub struct ContinuationEndpoint {
    probe: ContextProbe,
}

impl ContinuationEndpoint {
    pub fn new(probe: ContextProbe) -> Self {
        Self { probe }
    }
}

impl Endpoint for ContinuationEndpoint {
    fn route(&self) -> &str {
        CONTINUATION_ROUTE
    }

    fn handle(&self, ctx: &RequestContext) -> HandlerResult {
        self.probe.probe(ctx, Phase::AtEndpoint);
        Ok(Reply::empty())
    }
}
