//! Delay filters: probe, sleep without blocking the worker, probe again.
//!
//! [`DelayActionFilter`] is hook-shaped and leaves running the endpoint to
//! the pipeline. [`ContinuationFilter`] drives the rest of the pipeline
//! itself once the delay is over.

use std::time::Duration;

use ctxprobe_protocol::{HandlerResult, Phase, ProbeError, RequestContext};
use tracing::debug;

use crate::middleware::{ActionFilter, Middleware, Next};
use crate::probe::ContextProbe;

/// Filter configuration shared by both variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig {
    /// Artificial suspension between the two filter probes.
    pub delay: Duration,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(3000),
        }
    }
}

impl FilterConfig {
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

async fn probe_across_delay(probe: &ContextProbe, ctx: &RequestContext, delay: Duration) {
    probe.probe(ctx, Phase::BeforeSuspend);
    tokio::time::sleep(delay).await;
    probe.probe(ctx, Phase::AfterSuspend);
}

/// Hook-style filter; the post-action hook does nothing.
pub struct DelayActionFilter {
    probe: ContextProbe,
    config: FilterConfig,
}

impl DelayActionFilter {
    pub fn new(probe: ContextProbe, config: FilterConfig) -> Self {
        Self { probe, config }
    }
}

impl ActionFilter for DelayActionFilter {
    const NAME: &'static str = "delay-action";

    async fn on_action_executing(&self, ctx: &RequestContext) -> Result<(), ProbeError> {
        probe_across_delay(&self.probe, ctx, self.config.delay).await;
        Ok(())
    }
}

/// Continuation-style filter; invokes `next` after the delay and returns its
/// result unchanged.
pub struct ContinuationFilter {
    probe: ContextProbe,
    config: FilterConfig,
}

impl ContinuationFilter {
    pub fn new(probe: ContextProbe, config: FilterConfig) -> Self {
        Self { probe, config }
    }
}

impl Middleware for ContinuationFilter {
    const NAME: &'static str = "continuation";

    async fn handle<'a>(&'a self, ctx: &'a RequestContext, next: Next<'a>) -> HandlerResult {
        probe_across_delay(&self.probe, ctx, self.config.delay).await;
        debug!(request_id = %ctx.request_id, "continuing pipeline");
        next.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::endpoints::{Endpoint, ReproEndpoint};
    use crate::middleware::{ActionFilterMiddleware, MiddlewareDyn};
    use crate::probe::MemorySink;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn default_delay_is_three_seconds() {
        assert_eq!(FilterConfig::default().delay, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn action_filter_probes_before_and_after_delay() {
        let sink = Arc::new(MemorySink::new());
        let probe = ContextProbe::new(sink.clone());
        let filter = DelayActionFilter::new(probe, FilterConfig::with_delay(SHORT));
        let ctx = RequestContext::new("GET", "/repro");

        let started = tokio::time::Instant::now();
        filter.on_action_executing(&ctx).await.unwrap();
        assert!(started.elapsed() >= SHORT);

        let phases: Vec<Phase> = sink.records().iter().map(|r| r.phase).collect();
        assert_eq!(phases, vec![Phase::BeforeSuspend, Phase::AfterSuspend]);
        assert!(sink.records().iter().all(|r| r.request_id == ctx.request_id));
    }

    #[tokio::test]
    async fn both_variants_produce_the_same_probe_sequence() {
        let sink = Arc::new(MemorySink::new());
        let probe = ContextProbe::new(sink.clone());
        let endpoint = ReproEndpoint::new(probe.clone());
        let config = FilterConfig::with_delay(SHORT);

        let action: Vec<Box<dyn MiddlewareDyn>> = vec![Box::new(ActionFilterMiddleware::new(
            DelayActionFilter::new(probe.clone(), config),
        ))];
        let continuation: Vec<Box<dyn MiddlewareDyn>> =
            vec![Box::new(ContinuationFilter::new(probe.clone(), config))];

        let a = RequestContext::new("GET", endpoint.route());
        let b = RequestContext::new("GET", endpoint.route());
        Next::new(&action, &endpoint).run(&a).await.unwrap();
        Next::new(&continuation, &endpoint).run(&b).await.unwrap();

        let phases = |id: &str| -> Vec<Phase> {
            sink.for_request(id).iter().map(|r| r.phase).collect()
        };
        let expected = vec![Phase::BeforeSuspend, Phase::AfterSuspend, Phase::AtEndpoint];
        assert_eq!(phases(&a.request_id), expected);
        assert_eq!(phases(&b.request_id), expected);
    }
}
